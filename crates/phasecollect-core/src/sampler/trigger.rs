//! Trigger arm/fire/disarm protocol
//!
//! Both devices bind a trigger to the same physical signal line. The master
//! drives the line when fired; the slave starts sampling on the edge it sees.
//! Per pair the states run `Uninitialized -> Armed -> Fired/FireRequested ->
//! Disabled`.
//!
//! Trigger state is never cached here: every check re-queries the device.
//! The handles are recorded before either device is armed and dropped only
//! once both devices have disarmed, so no armed device goes unaccounted for.

use crate::device::{DeviceController, RxChannel, Trigger, TriggerRole, TriggerSignal, TriggerState};
use crate::error::SamplerError;

/// Trigger handles held for a pair that is or may be armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPair {
    pub master: Trigger,
    pub slave: Trigger,
}

/// Drives the trigger protocol across the two devices
#[derive(Debug)]
pub struct TriggerCoordinator {
    signal: TriggerSignal,
    channel: RxChannel,
    triggers: Option<TriggerPair>,
}

impl TriggerCoordinator {
    pub fn new(signal: TriggerSignal) -> Self {
        Self {
            signal,
            channel: RxChannel::Rx0,
            triggers: None,
        }
    }

    pub fn signal(&self) -> TriggerSignal {
        self.signal
    }

    /// Handles of the armed pair, if any
    pub fn triggers(&self) -> Option<&TriggerPair> {
        self.triggers.as_ref()
    }

    /// Whether either device may still be armed and needs a disarm
    pub fn is_armed(&self) -> bool {
        self.triggers.is_some()
    }

    fn init(
        &self,
        device: &dyn DeviceController,
        role: TriggerRole,
    ) -> Result<Trigger, SamplerError> {
        let mut trigger = device
            .trigger_init(self.channel, self.signal)
            .map_err(|e| SamplerError::device(device, "initialize trigger", e))?;
        trigger.role = role;
        Ok(trigger)
    }

    /// Initialize triggers on both devices and arm them, master first
    ///
    /// On any arm failure both devices are disarmed before the error is
    /// returned. If that disarm fails too the handles are kept, and a later
    /// [`disarm`](Self::disarm) retries both devices.
    pub fn init_and_arm(
        &mut self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
    ) -> Result<(), SamplerError> {
        if self.triggers.is_some() {
            return Err(SamplerError::Protocol("triggers are already armed".into()));
        }

        let pair = TriggerPair {
            master: self.init(master, TriggerRole::Master)?,
            slave: self.init(slave, TriggerRole::Slave)?,
        };
        // From here on any exit must go through disarm
        self.triggers = Some(pair);

        let armed = master
            .trigger_arm(&pair.master, true)
            .map_err(|e| SamplerError::device(master, "arm master trigger", e))
            .and_then(|()| {
                slave
                    .trigger_arm(&pair.slave, true)
                    .map_err(|e| SamplerError::device(slave, "arm slave trigger", e))
            })
            .and_then(|()| self.verify_armed(master, slave, &pair));

        if let Err(err) = armed {
            if let Err(disarm_err) = self.disarm(master, slave) {
                tracing::error!(error = %disarm_err, "Rollback disarm after arm failure failed");
            }
            return Err(err);
        }

        tracing::info!(signal = ?self.signal, "Triggers armed");
        Ok(())
    }

    fn verify_armed(
        &self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
        pair: &TriggerPair,
    ) -> Result<(), SamplerError> {
        let master_state = self.query(master, &pair.master)?;
        let slave_state = self.query(slave, &pair.slave)?;
        if !master_state.is_armed
            || master_state.role != TriggerRole::Master
            || !slave_state.is_armed
            || slave_state.role != TriggerRole::Slave
        {
            return Err(SamplerError::Protocol(format!(
                "trigger did not arm: master {:?}, slave {:?}",
                master_state, slave_state
            )));
        }
        Ok(())
    }

    fn query(
        &self,
        device: &dyn DeviceController,
        trigger: &Trigger,
    ) -> Result<TriggerState, SamplerError> {
        device
            .trigger_state(trigger)
            .map_err(|e| SamplerError::device(device, "query trigger state", e))
    }

    /// Fire the master trigger and confirm the device accepted the command
    pub fn fire(&self, master: &dyn DeviceController) -> Result<(), SamplerError> {
        let pair = self
            .triggers
            .ok_or_else(|| SamplerError::Protocol("fire requested before arming".into()))?;

        master
            .trigger_fire(&pair.master)
            .map_err(|e| SamplerError::device(master, "fire trigger", e))?;

        let state = self.query(master, &pair.master)?;
        if !(state.has_fired || state.fire_requested) {
            return Err(SamplerError::Protocol(format!(
                "{}: trigger neither fired nor requested after fire ({:?})",
                master.name(),
                state
            )));
        }

        tracing::info!(device = master.name(), "Trigger fired");
        Ok(())
    }

    /// Disarm both devices
    ///
    /// Both devices are always attempted; the first failure is returned. The
    /// handles are dropped only when both succeed, so a failed disarm is
    /// retried by the next call. Without recorded handles this is a no-op.
    pub fn disarm(
        &mut self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
    ) -> Result<(), SamplerError> {
        let Some(pair) = self.triggers else {
            return Ok(());
        };

        let mut first_error = None;
        for (device, trigger, step) in [
            (master, &pair.master, "disarm master trigger"),
            (slave, &pair.slave, "disarm slave trigger"),
        ] {
            if let Err(e) = device.trigger_arm(trigger, false) {
                tracing::error!(device = device.name(), error = %e, "Trigger disarm failed");
                first_error.get_or_insert(SamplerError::device(device, step, e));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                self.triggers = None;
                tracing::debug!("Triggers disarmed");
                Ok(())
            }
        }
    }

    pub fn master_state(&self, master: &dyn DeviceController) -> Result<TriggerState, SamplerError> {
        let pair = self
            .triggers
            .ok_or_else(|| SamplerError::Protocol("triggers not armed".into()))?;
        self.query(master, &pair.master)
    }

    pub fn slave_state(&self, slave: &dyn DeviceController) -> Result<TriggerState, SamplerError> {
        let pair = self
            .triggers
            .ok_or_else(|| SamplerError::Protocol("triggers not armed".into()))?;
        self.query(slave, &pair.slave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{SimSignal, SimulatedRadio};
    use crate::device::Operation;
    use crate::error::ErrorKind;

    fn handle(role: TriggerRole) -> Trigger {
        Trigger {
            channel: RxChannel::Rx0,
            role,
            signal: TriggerSignal::MiniExp1,
        }
    }

    fn assert_disabled(device: &SimulatedRadio) {
        let state = device.trigger_state(&handle(TriggerRole::Disabled)).unwrap();
        assert!(!state.is_armed, "{} left armed", device.name());
        assert_eq!(state.role, TriggerRole::Disabled);
    }

    #[test]
    fn test_arm_assigns_roles() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        coord.init_and_arm(&master, &slave).unwrap();

        let m = coord.master_state(&master).unwrap();
        let s = coord.slave_state(&slave).unwrap();
        assert!(m.is_armed && s.is_armed);
        assert_eq!(m.role, TriggerRole::Master);
        assert_eq!(s.role, TriggerRole::Slave);
        assert!(!m.has_fired);
    }

    #[test]
    fn test_fire_reaches_slave() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        coord.init_and_arm(&master, &slave).unwrap();
        coord.fire(&master).unwrap();

        assert!(coord.master_state(&master).unwrap().fire_requested);
        assert!(coord.slave_state(&slave).unwrap().has_fired);
    }

    #[test]
    fn test_slave_arm_failure_disarms_master() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        slave.inject_fault(Operation::TriggerArm);
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);

        let err = coord.init_and_arm(&master, &slave).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!coord.is_armed());
        assert_disabled(&master);
    }

    #[test]
    fn test_fire_before_arm_is_protocol_error() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        let coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        assert_eq!(coord.fire(&master).unwrap_err().kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_ignored_fire_is_protocol_error() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        master.ignore_fire_commands(true);
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        coord.init_and_arm(&master, &slave).unwrap();

        assert_eq!(coord.fire(&master).unwrap_err().kind(), ErrorKind::Protocol);
        coord.disarm(&master, &slave).unwrap();
        assert_disabled(&master);
        assert_disabled(&slave);
    }

    #[test]
    fn test_disarm_after_arm_and_after_fire() {
        for fire in [false, true] {
            let (master, slave) = SimulatedRadio::pair(SimSignal::default());
            let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
            coord.init_and_arm(&master, &slave).unwrap();
            if fire {
                coord.fire(&master).unwrap();
            }
            coord.disarm(&master, &slave).unwrap();
            assert_disabled(&master);
            assert_disabled(&slave);
            assert!(!coord.is_armed());
        }
    }

    #[test]
    fn test_disarm_attempts_both_devices() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        coord.init_and_arm(&master, &slave).unwrap();

        master.inject_fault(Operation::TriggerDisarm);
        let err = coord.disarm(&master, &slave).unwrap_err();
        assert!(err.to_string().contains("disarm master trigger"));
        assert_disabled(&slave);
        assert!(coord.is_armed());
    }

    #[test]
    fn test_failed_rollback_keeps_handles_for_retry() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        slave.inject_fault(Operation::TriggerArm);
        master.inject_fault(Operation::TriggerDisarm);
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);

        let err = coord.init_and_arm(&master, &slave).unwrap_err();
        assert!(err.to_string().contains("arm slave trigger"), "{}", err);
        assert!(coord.is_armed());
        assert!(master.trigger_state(&handle(TriggerRole::Disabled)).unwrap().is_armed);

        // Still failing: handles survive another attempt
        assert!(coord.disarm(&master, &slave).is_err());
        assert!(coord.is_armed());

        master.clear_faults();
        slave.clear_faults();
        coord.disarm(&master, &slave).unwrap();
        assert!(!coord.is_armed());
        assert_disabled(&master);
        assert_disabled(&slave);
    }

    #[test]
    fn test_master_arm_failure_leaves_nothing_armed() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        master.inject_fault(Operation::TriggerArm);
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);

        let err = coord.init_and_arm(&master, &slave).unwrap_err();
        assert!(err.to_string().contains("arm master trigger"), "{}", err);
        assert!(!coord.is_armed());
        assert_disabled(&master);
        assert_disabled(&slave);
    }

    #[test]
    fn test_disarm_without_arm_is_noop() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        coord.disarm(&master, &slave).unwrap();
    }

    #[test]
    fn test_double_arm_rejected() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        let mut coord = TriggerCoordinator::new(TriggerSignal::MiniExp1);
        coord.init_and_arm(&master, &slave).unwrap();
        assert_eq!(
            coord.init_and_arm(&master, &slave).unwrap_err().kind(),
            ErrorKind::Protocol
        );
    }
}
