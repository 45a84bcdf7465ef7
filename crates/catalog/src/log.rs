//! Logical log records of catalog changes. Records name objects by their
//! identifiers only, never by store locators.

use {
    crate::error::{CodecSnafu, InvalidLogRecordSnafu, Result, TupleSnafu},
    def::{
        codec::{Decoder, Encoder, TupleCodec},
        tuple_struct, u32_enum, ObjectId, Tuple, Value,
    },
    snafu::prelude::*,
};

u32_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum LogKind {
        CreateArea = 1,
        AlterArea = 2,
        DropArea = 3,
        CreateTable = 4,
        DropTable = 5,
        AlterTableArea = 6,
        RenameTable = 7,
        CreateIndex = 8,
        DropIndex = 9,
        MoveDatabase = 10,
        DropDatabase = 11,
    }
}

impl LogKind {
    pub fn is_undoable(&self) -> bool {
        !matches!(self, Self::DropDatabase | Self::DropTable | Self::DropIndex)
    }
}

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct AreaRecord {
        area: (ObjectId, Uint),
        name: (String, String),
        path: (String, String),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct AlterAreaRecord {
        area: (ObjectId, Uint),
        from: (String, String),
        to: (String, String),
    }

    /// Every id the creation handed out, so redo reproduces them.
    #[derive(Debug, Clone, PartialEq)]
    struct CreateTableRecord {
        table: (ObjectId, Uint),
        name: (String, String),
        area: (ObjectId, Uint),
        file: (ObjectId, Uint),
        content: (ObjectId, Uint),
        column_ids: (Vec<u32>, UintArray),
        column_names: (Vec<String>, StringArray),
        column_types: (Vec<String>, StringArray),
        nullable: (Vec<u32>, UintArray),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct DropRecord {
        id: (ObjectId, Uint),
        name: (String, String),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct AlterTableAreaRecord {
        table: (ObjectId, Uint),
        from: (ObjectId, Uint),
        to: (ObjectId, Uint),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct RenameTableRecord {
        table: (ObjectId, Uint),
        from: (String, String),
        to: (String, String),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct CreateIndexRecord {
        index: (ObjectId, Uint),
        table: (ObjectId, Uint),
        name: (String, String),
        unique: (bool, Boolean),
        columns: (Vec<u32>, UintArray),
        file: (ObjectId, Uint),
        constraint: (ObjectId, Uint),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct MoveDatabaseRecord {
        database: (ObjectId, Uint),
        from: (String, String),
        to: (String, String),
    }
}

/// One logged catalog change.
#[derive(Debug, Clone, PartialEq)]
pub enum LogData {
    CreateArea(AreaRecord),
    AlterArea(AlterAreaRecord),
    DropArea(AreaRecord),
    CreateTable(CreateTableRecord),
    DropTable(DropRecord),
    AlterTableArea(AlterTableAreaRecord),
    RenameTable(RenameTableRecord),
    CreateIndex(CreateIndexRecord),
    DropIndex(DropRecord),
    MoveDatabase(MoveDatabaseRecord),
    DropDatabase(DropRecord),
}

impl LogData {
    pub fn kind(&self) -> LogKind {
        match self {
            Self::CreateArea(_) => LogKind::CreateArea,
            Self::AlterArea(_) => LogKind::AlterArea,
            Self::DropArea(_) => LogKind::DropArea,
            Self::CreateTable(_) => LogKind::CreateTable,
            Self::DropTable(_) => LogKind::DropTable,
            Self::AlterTableArea(_) => LogKind::AlterTableArea,
            Self::RenameTable(_) => LogKind::RenameTable,
            Self::CreateIndex(_) => LogKind::CreateIndex,
            Self::DropIndex(_) => LogKind::DropIndex,
            Self::MoveDatabase(_) => LogKind::MoveDatabase,
            Self::DropDatabase(_) => LogKind::DropDatabase,
        }
    }

    /// The identifier of the object the record is about.
    pub fn subject(&self) -> ObjectId {
        match self {
            Self::CreateArea(r) | Self::DropArea(r) => r.area,
            Self::AlterArea(r) => r.area,
            Self::CreateTable(r) => r.table,
            Self::DropTable(r) | Self::DropIndex(r) | Self::DropDatabase(r) => r.id,
            Self::AlterTableArea(r) => r.table,
            Self::RenameTable(r) => r.table,
            Self::CreateIndex(r) => r.index,
            Self::MoveDatabase(r) => r.database,
        }
    }

    /// `[kind, fields...]`, encoded with the tuple codec.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut tuple = vec![Value::Uint(self.kind().into())];
        tuple.extend(match self.clone() {
            Self::CreateArea(r) | Self::DropArea(r) => Tuple::from(r),
            Self::AlterArea(r) => r.into(),
            Self::CreateTable(r) => r.into(),
            Self::DropTable(r) | Self::DropIndex(r) | Self::DropDatabase(r) => r.into(),
            Self::AlterTableArea(r) => r.into(),
            Self::RenameTable(r) => r.into(),
            Self::CreateIndex(r) => r.into(),
            Self::MoveDatabase(r) => r.into(),
        });
        TupleCodec.encode(&tuple).context(CodecSnafu)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (mut tuple, _) = TupleCodec.decode(bytes).context(CodecSnafu)?;
        ensure!(
            !tuple.is_empty(),
            InvalidLogRecordSnafu {
                details: "empty record"
            }
        );
        let fields = tuple.split_off(1);
        let kind = match tuple.first() {
            Some(Value::Uint(raw)) => LogKind::try_from(*raw).ok(),
            _ => None,
        }
        .context(InvalidLogRecordSnafu {
            details: format!("unknown record kind {:?}", tuple.first()),
        })?;

        Ok(match kind {
            LogKind::CreateArea => Self::CreateArea(fields.try_into().context(TupleSnafu)?),
            LogKind::AlterArea => Self::AlterArea(fields.try_into().context(TupleSnafu)?),
            LogKind::DropArea => Self::DropArea(fields.try_into().context(TupleSnafu)?),
            LogKind::CreateTable => Self::CreateTable(fields.try_into().context(TupleSnafu)?),
            LogKind::DropTable => Self::DropTable(fields.try_into().context(TupleSnafu)?),
            LogKind::AlterTableArea => {
                Self::AlterTableArea(fields.try_into().context(TupleSnafu)?)
            }
            LogKind::RenameTable => Self::RenameTable(fields.try_into().context(TupleSnafu)?),
            LogKind::CreateIndex => Self::CreateIndex(fields.try_into().context(TupleSnafu)?),
            LogKind::DropIndex => Self::DropIndex(fields.try_into().context(TupleSnafu)?),
            LogKind::MoveDatabase => Self::MoveDatabase(fields.try_into().context(TupleSnafu)?),
            LogKind::DropDatabase => Self::DropDatabase(fields.try_into().context(TupleSnafu)?),
        })
    }
}
