use {
    crate::error::{FaultInjectedSnafu, Result},
    parking_lot::Mutex,
    std::collections::HashMap,
};

/// Named failure points. An armed point fails once, at its N-th hit, and then disarms.
#[derive(Debug, Default)]
pub struct FaultInjector {
    armed: Mutex<HashMap<String, usize>>,
}

impl FaultInjector {
    /// Makes `point` fail on its `nth` hit, counting from 1.
    pub fn arm(&self, point: &str, nth: usize) {
        self.armed.lock().insert(point.to_string(), nth.max(1));
    }

    pub fn disarm(&self, point: &str) {
        self.armed.lock().remove(point);
    }

    pub fn is_armed(&self, point: &str) -> bool {
        self.armed.lock().contains_key(point)
    }

    pub fn check(&self, point: &str) -> Result<()> {
        let mut armed = self.armed.lock();
        match armed.get_mut(point) {
            Some(remaining) if *remaining > 1 => {
                *remaining -= 1;
                Ok(())
            }
            Some(_) => {
                armed.remove(point);
                tracing::warn!(point, "injected fault fired");
                FaultInjectedSnafu { point }.fail()
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::Error};

    #[test]
    fn fires_once_at_nth_hit() {
        let faults = FaultInjector::default();
        faults.arm("catalog_store.insert.index", 2);

        assert!(faults.check("catalog_store.insert.index").is_ok());
        assert!(matches!(
            faults.check("catalog_store.insert.index"),
            Err(Error::FaultInjected { .. })
        ));
        assert!(faults.check("catalog_store.insert.index").is_ok());
        assert!(faults.check("elsewhere").is_ok());
    }
}
