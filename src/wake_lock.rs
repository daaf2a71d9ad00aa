use std::{fs, io, path::PathBuf};

/// Keeps the host from suspending while collection runs.
pub trait WakeLock: Send + Sync {
    fn acquire(&self) -> io::Result<()>;
    fn release(&self) -> io::Result<()>;
}

/// Linux autosleep wake lock: the lock name is written to
/// `{dir}/wake_lock` to take it and to `{dir}/wake_unlock` to drop it.
#[derive(Debug, Clone)]
pub struct SysfsWakeLock {
    dir: PathBuf,
    name: String,
}

impl SysfsWakeLock {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }
}

impl WakeLock for SysfsWakeLock {
    fn acquire(&self) -> io::Result<()> {
        fs::write(self.dir.join("wake_lock"), &self.name)
    }

    fn release(&self) -> io::Result<()> {
        fs::write(self.dir.join("wake_unlock"), &self.name)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    pub struct CountingWakeLock {
        pub acquired: AtomicUsize,
        pub released: AtomicUsize,
    }

    impl CountingWakeLock {
        pub fn counts(&self) -> (usize, usize) {
            (self.acquired.load(Ordering::SeqCst), self.released.load(Ordering::SeqCst))
        }
    }

    impl WakeLock for CountingWakeLock {
        fn acquire(&self) -> io::Result<()> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) -> io::Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_lock_name_to_sysfs_files() {
        let dir = std::env::temp_dir().join(format!("wake_lock_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let lock = SysfsWakeLock::new(&dir, "sensor_collector");

        lock.acquire().unwrap();
        assert_eq!(fs::read_to_string(dir.join("wake_lock")).unwrap(), "sensor_collector");
        lock.release().unwrap();
        assert_eq!(fs::read_to_string(dir.join("wake_unlock")).unwrap(), "sensor_collector");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_sysfs_is_an_error() {
        let lock = SysfsWakeLock::new("/nonexistent/power", "x");
        assert!(lock.acquire().is_err());
    }
}
