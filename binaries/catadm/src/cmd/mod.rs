mod error;

use {
    catalog::{
        entity::{File, Index},
        persist::Persist,
        CatalogConfig, Database, Environment, Severity, Treatment,
    },
    def::{
        transaction::{SessionId, TransactionContext},
        ObjectId,
    },
    error::{CatalogSnafu, OutputSnafu},
    snafu::prelude::*,
    std::io::Write,
};
pub use error::{Error, Result};

const SESSION: SessionId = 0;

/// The database a command works on.
pub struct Target {
    pub config: CatalogConfig,
    pub name: String,
    pub id: ObjectId,
}

impl Target {
    fn open(&self) -> Result<Database> {
        let env = Environment::new(self.config.clone()).context(CatalogSnafu)?;
        Database::open(env, self.id, &self.name).context(CatalogSnafu)
    }
}

pub fn init(target: &Target) -> Result<()> {
    let env = Environment::new(target.config.clone()).context(CatalogSnafu)?;
    let tx = TransactionContext::read_write(SESSION);
    let db = Database::create(env, &tx, target.id, &target.name).context(CatalogSnafu)?;

    tracing::info!(root = %db.root().display(), "database initialized");
    db.close(&tx).context(CatalogSnafu)
}

/// Prints every finding and returns whether nothing uncorrected is left.
pub fn verify(target: &Target, correct: bool, out: &mut impl Write) -> Result<bool> {
    let mut db = target.open()?;
    let treatment = if correct {
        Treatment::CORRECT
    } else {
        Treatment::REPORT
    };
    let progress = db.verify(treatment).context(CatalogSnafu)?;

    for finding in progress.findings() {
        writeln!(out, "{finding}").context(OutputSnafu)?;
    }
    writeln!(
        out,
        "{} corrected, {} correctable, {} inconsistent",
        progress.count(Severity::Corrected),
        progress.count(Severity::Correctable),
        progress.count(Severity::Inconsistent),
    )
    .context(OutputSnafu)?;

    if correct {
        let tx = TransactionContext::read_write(SESSION);
        db.close(&tx).context(CatalogSnafu)?;
    }
    Ok(progress.is_good())
}

pub fn show(target: &Target, out: &mut impl Write) -> Result<()> {
    let db = target.open()?;
    let objects = db.objects();

    writeln!(out, "database {} at {}", db.id(), db.root().display()).context(OutputSnafu)?;
    for area in objects.areas.values() {
        writeln!(
            out,
            "area {} {} {}",
            area.object().id(),
            area.object().name(),
            area.path()
        )
        .context(OutputSnafu)?;
    }

    for table in objects.tables.values() {
        let object = table.object();
        write!(out, "table {} {}", object.id(), object.name()).context(OutputSnafu)?;
        if table.area().is_valid() {
            write!(out, " in area {}", table.area()).context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        for column in objects.columns_of(table) {
            writeln!(
                out,
                "  column {} {} {}{}",
                column.position(),
                column.object().name(),
                column.type_name(),
                if column.is_nullable() { "" } else { " not null" }
            )
            .context(OutputSnafu)?;
        }
        for index in table.indexes().filter_map(|id| db.get::<Index>(id)) {
            writeln!(
                out,
                "  {}index {} on {:?}",
                if index.is_unique() { "unique " } else { "" },
                index.object().name(),
                index.columns()
            )
            .context(OutputSnafu)?;
        }
        for constraint in table.constraints().filter_map(|id| objects.constraints.get(&id)) {
            writeln!(
                out,
                "  constraint {} {} on {:?}",
                constraint.object().id(),
                constraint.kind(),
                constraint.columns()
            )
            .context(OutputSnafu)?;
        }
        for file in table.files().filter_map(|id| db.get::<File>(id)) {
            writeln!(
                out,
                "  file {} {} {}",
                file.object().id(),
                file.kind(),
                file.path().display()
            )
            .context(OutputSnafu)?;
        }
    }
    Ok(())
}
