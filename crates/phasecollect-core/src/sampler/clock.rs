//! Reference clock distribution
//!
//! The master runs from its onboard oscillator and drives it out of its clock
//! output; the slave locks to that reference on its clock input and keeps
//! its own output off so the two never drive the cable at once.

use crate::device::{ClockSelect, DeviceController};
use crate::error::SamplerError;

/// Put the pair on one shared time base
///
/// Must run before channel configuration and trigger arming. Any failure
/// leaves the clocks in an unknown state; re-run the whole sequence.
pub fn configure_clocks(
    master: &dyn DeviceController,
    slave: &dyn DeviceController,
) -> Result<(), SamplerError> {
    master
        .set_clock_select(ClockSelect::Onboard)
        .map_err(|e| SamplerError::device(master, "select onboard clock", e))?;
    slave
        .set_clock_select(ClockSelect::External)
        .map_err(|e| SamplerError::device(slave, "select external clock", e))?;
    slave
        .set_clock_output(false)
        .map_err(|e| SamplerError::device(slave, "disable clock output", e))?;
    master
        .set_clock_output(true)
        .map_err(|e| SamplerError::device(master, "enable clock output", e))?;

    tracing::info!(
        master = master.name(),
        slave = slave.name(),
        "Reference clock shared"
    );
    Ok(())
}

/// True when both devices read back the expected clock configuration
pub fn clocks_configured(
    master: &dyn DeviceController,
    slave: &dyn DeviceController,
) -> Result<bool, SamplerError> {
    let read = |dev: &dyn DeviceController| -> Result<(ClockSelect, bool), SamplerError> {
        let select = dev
            .clock_select()
            .map_err(|e| SamplerError::device(dev, "read clock select", e))?;
        let output = dev
            .clock_output()
            .map_err(|e| SamplerError::device(dev, "read clock output", e))?;
        Ok((select, output))
    };
    Ok(read(master)? == (ClockSelect::Onboard, true) && read(slave)? == (ClockSelect::External, false))
}
