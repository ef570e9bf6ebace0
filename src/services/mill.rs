//! Mill actuator - one on/wait/off cycle on the configured switch
//!
//! The switch state is never cached: every cycle looks the switch up and
//! issues a blind ON followed by OFF after the configured duration.

use crate::domain::types::{CycleReport, SwitchIndex, SwitchState};
use crate::io::hue::{BridgeError, SwitchControl};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("switch {index} lookup failed: {source}")]
    Lookup {
        index: SwitchIndex,
        #[source]
        source: BridgeError,
    },
    #[error("switch {index} could not be turned on: {source}")]
    SwitchOn {
        index: SwitchIndex,
        #[source]
        source: BridgeError,
    },
    /// The switch may have been left on
    #[error("switch {index} could not be turned off: {source}")]
    SwitchOff {
        index: SwitchIndex,
        #[source]
        source: BridgeError,
    },
}

pub struct Mill<S> {
    switch: S,
    index: SwitchIndex,
    duration: Duration,
}

impl<S: SwitchControl> Mill<S> {
    pub fn new(switch: S, index: SwitchIndex, duration: Duration) -> Self {
        Self { switch, index, duration }
    }

    pub fn index(&self) -> SwitchIndex {
        self.index
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run one cycle: lookup, ON, sleep, OFF
    ///
    /// A failed lookup or ON ends the cycle without touching the switch further.
    pub async fn run_cycle(&self) -> Result<CycleReport, ActuationError> {
        let index = self.index;
        let info = self
            .switch
            .lookup(index)
            .await
            .map_err(|source| ActuationError::Lookup { index, source })?;

        if !info.reachable {
            warn!(switch = %index, name = %info.name, "switch_unreachable");
        }

        self.switch
            .set_state(index, SwitchState::On)
            .await
            .map_err(|source| ActuationError::SwitchOn { index, source })?;
        let on_at = Instant::now();
        info!(
            switch = %index,
            name = %info.name,
            duration_ms = %self.duration.as_millis(),
            "switch_on"
        );

        tokio::time::sleep(self.duration).await;

        let off = self.switch.set_state(index, SwitchState::Off).await;
        let on_duration = on_at.elapsed();
        off.map_err(|source| ActuationError::SwitchOff { index, source })?;
        info!(switch = %index, on_ms = %on_duration.as_millis(), "switch_off");

        Ok(CycleReport { index, switch_name: info.name, on_duration })
    }
}
