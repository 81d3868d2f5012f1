use std::time::SystemTime;

use chrono::{DateTime, Local, SubsecRound};

pub trait SystemTimeExt {
    fn to_local_seconds(&self) -> DateTime<Local>;
}

impl SystemTimeExt for SystemTime {
    /// Local instant with the fractional second dropped, matching the
    /// resolution of backup directory names.
    fn to_local_seconds(&self) -> DateTime<Local> {
        DateTime::<Local>::from(*self).trunc_subsecs(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::time::Duration;

    #[test]
    fn test_to_local_seconds_drops_subseconds() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_704_071_025_750);

        let local = time.to_local_seconds();

        assert_eq!(local.nanosecond(), 0);
        assert_eq!(local.timestamp(), 1_704_071_025);
    }
}
