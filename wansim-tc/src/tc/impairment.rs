//! Impairment parameters and their legal domain.

use std::fmt;

/// Upper bound for the loss percentage.
pub const MAX_LOSS_PERCENT: i64 = 100;
/// Upper bound for the delay, in milliseconds.
pub const MAX_DELAY_MS: i64 = 3_000;

/// A request rejected before anything is submitted to `tc`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Loss outside the percent range.
    #[error("loss {0}% is outside [0, {MAX_LOSS_PERCENT}]")]
    Loss(i64),
    /// Delay outside the allowed milliseconds.
    #[error("delay {0}ms is outside [0, {MAX_DELAY_MS}]")]
    Delay(i64),
    /// Both values are zero. Removing an impairment is a clear.
    #[error("loss and delay are both zero, use clear instead")]
    NoOp,
    /// The interface name cannot be placed on a batch line.
    #[error("invalid interface name {name:?}: {reason}")]
    InterfaceName {
        /// The name as received.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Checks a requested loss/delay pair. Rules apply in order and the first violation wins.
pub fn validate(loss: i64, delay: i64) -> Result<(), ValidationError> {
    if !(0..=MAX_LOSS_PERCENT).contains(&loss) {
        return Err(ValidationError::Loss(loss));
    }
    if !(0..=MAX_DELAY_MS).contains(&delay) {
        return Err(ValidationError::Delay(delay));
    }
    if loss == 0 && delay == 0 {
        return Err(ValidationError::NoOp);
    }

    Ok(())
}

/// A netem impairment that passed [`validate`].
///
/// A zero field is not applied: `loss 0%` and `delay 0ms` are left out of the netem clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impairment {
    loss: u32,
    delay: u32,
}

impl Impairment {
    /// Validates `loss` percent and `delay` milliseconds.
    pub fn new(loss: i64, delay: i64) -> Result<Self, ValidationError> {
        validate(loss, delay)?;

        // Both values are within u32 range after validation.
        Ok(Self { loss: loss as u32, delay: delay as u32 })
    }

    /// Builds an impairment from values the caller guarantees to be legal.
    pub(crate) fn new_unchecked(loss: u32, delay: u32) -> Self {
        debug_assert!(validate(loss.into(), delay.into()).is_ok());
        Self { loss, delay }
    }

    /// Loss in percent, `None` if not applied.
    pub fn loss(&self) -> Option<u32> {
        (self.loss > 0).then_some(self.loss)
    }

    /// Delay in milliseconds, `None` if not applied.
    pub fn delay(&self) -> Option<u32> {
        (self.delay > 0).then_some(self.delay)
    }
}

/// Renders the netem clause, e.g. `loss 10% delay 50ms`.
impl fmt::Display for Impairment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.loss(), self.delay()) {
            (Some(loss), Some(delay)) => write!(f, "loss {loss}% delay {delay}ms"),
            (Some(loss), None) => write!(f, "loss {loss}%"),
            (None, Some(delay)) => write!(f, "delay {delay}ms"),
            // Unreachable through `new`, which rejects the no-op pair.
            (None, None) => Ok(()),
        }
    }
}
