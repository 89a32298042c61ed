//! Fixed-interval driver for the presentation loop

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::display::DisplaySurface;
use crate::error::{Error, Result};
use crate::pipeline::command::Command;
use crate::pipeline::presenter::PresentationLoop;

/// `1000 / rate` whole milliseconds, at least one.
pub fn tick_interval(declared_rate: f64) -> Duration {
    let ms = if declared_rate.is_finite() && declared_rate > 0.0 {
        (1000.0 / declared_rate) as u64
    } else {
        0
    };
    Duration::from_millis(ms.max(1))
}

/// Run ticks until the surface asks to quit or the process is interrupted.
///
/// Each tick drains pending commands and then runs one full cycle to
/// completion; a late tick is delayed rather than bunched.
pub async fn run(presenter: &mut PresentationLoop, display: &mut dyn DisplaySurface) -> Result<()> {
    let period = tick_interval(presenter.params().declared_rate);
    info!("Preview running every {:?}", period);

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            res = &mut interrupt => {
                if let Err(e) = res {
                    warn!("Interrupt handler failed: {}", e);
                }
                info!("Interrupt received");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        for command in display.poll_commands() {
            if command == Command::Quit {
                info!("Quit requested");
                return Ok(());
            }
            // Failures are recoverable and already surfaced in the status
            if let Err(e) = presenter.handle(command) {
                error!("{:?} failed: {}", command, e);
            }
        }

        match presenter.tick(display) {
            Ok(_) => {}
            Err(e @ Error::Display(_)) => return Err(e),
            Err(e) => warn!("Tick failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_truncates_to_whole_milliseconds() {
        assert_eq!(tick_interval(30.0), Duration::from_millis(33));
        assert_eq!(tick_interval(60.0), Duration::from_millis(16));
        assert_eq!(tick_interval(5000.0), Duration::from_millis(1));
        assert_eq!(tick_interval(0.0), Duration::from_millis(1));
    }
}
