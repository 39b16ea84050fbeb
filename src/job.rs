use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ConvertError, Result};
use crate::progress::progress_channel;
use crate::transcoder::Transcoder;

/// At most one conversion per orchestrator.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl SingleFlight {
    pub fn new() -> Self {
        SingleFlight { busy: AtomicBool::new(false) }
    }

    pub fn acquire(&self) -> Result<FlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ConvertError::Busy)?;
        Ok(FlightGuard { flight: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}

/// Runs one engine command while feeding its progress fractions to
/// `on_fraction`. Each call gets its own channel, so updates from one file
/// never reach another file's slot.
pub async fn execute_with_progress<T, F>(
    engine: &T,
    args: &[String],
    mut on_fraction: F,
) -> Result<()>
where
    T: Transcoder + ?Sized,
    F: FnMut(f64),
{
    let (tx, mut rx) = progress_channel();
    let run = engine.execute(args, tx);
    let drain = async {
        while let Some(f) = rx.recv().await {
            on_fraction(f);
        }
    };
    let (result, ()) = tokio::join!(run, drain);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let flight = SingleFlight::new();
        let guard = flight.acquire().unwrap();
        assert!(flight.is_busy());
        assert!(matches!(flight.acquire(), Err(ConvertError::Busy)));
        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.acquire().is_ok());
    }
}
