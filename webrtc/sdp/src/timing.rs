//! Session timing (`t=`).

use std::fmt;

use crate::errors::DecodeError;

/// `t=<start> <stop>`. WebRTC peers always send `t=0 0`, an unbounded session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub start_time: u64,
    pub stop_time: u64,
}

impl Timing {
    pub fn is_unbounded(&self) -> bool {
        self.start_time == 0 || self.stop_time == 0
    }

    /// A bounded session may not stop before it starts.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if !self.is_unbounded() && self.stop_time < self.start_time {
            return Err(DecodeError::malformed(format!(
                "Timing stops at {} before starting at {}",
                self.stop_time, self.start_time
            )));
        }
        Ok(())
    }

    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        let mut times = value.split_whitespace().map(str::parse::<u64>);
        let timing = match (times.next(), times.next(), times.next()) {
            (Some(Ok(start_time)), Some(Ok(stop_time)), None) => Self {
                start_time,
                stop_time,
            },
            _ => return Err(DecodeError::malformed(format!("Invalid timing {value}"))),
        };
        timing.validate()?;
        Ok(timing)
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={} {}\r\n", self.start_time, self.stop_time)
    }
}
