// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent reservation state for the simulated logical unit.
//!
//! Registrations are tracked per I_T nexus. For all registrants types every
//! registered nexus holds the reservation; otherwise only the nexus that
//! reserved does.

use super::lun::ScsiError;
use super::NexusId;
use scsi_defs::Ascq;
use scsi_defs::ReservationType;
use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::num::Wrapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
    pub holder: NexusId,
    pub reservation_type: ReservationType,
}

/// Which class of medium access a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Unit attentions owed to other nexuses after an operation.
pub(crate) type Notices = Vec<(NexusId, Ascq)>;

#[derive(Debug, Default)]
pub(crate) struct ReservationState {
    generation: Wrapping<u32>,
    registrations: BTreeMap<NexusId, NonZeroU64>,
    reservation: Option<Reservation>,
}

fn valid_type(ty: ReservationType) -> bool {
    matches!(
        ty,
        ReservationType::WRITE_EXCLUSIVE
            | ReservationType::EXCLUSIVE
            | ReservationType::WRITE_EXCLUSIVE_REGISTRANTS
            | ReservationType::EXCLUSIVE_REGISTRANTS
            | ReservationType::WRITE_EXCLUSIVE_ALL_REGISTRANTS
            | ReservationType::EXCLUSIVE_ALL_REGISTRANTS
    )
}

impl ReservationState {
    pub fn generation(&self) -> u32 {
        self.generation.0
    }

    pub fn keys(&self) -> Vec<u64> {
        self.registrations.values().map(|k| k.get()).collect()
    }

    pub fn has_registrations(&self) -> bool {
        !self.registrations.is_empty()
    }

    pub fn reservation(&self) -> Option<Reservation> {
        self.reservation
    }

    /// The key reported by READ RESERVATION, zero for all registrants types.
    pub fn reservation_key(&self) -> Option<u64> {
        let res = self.reservation?;
        if res.reservation_type.is_all_registrants() {
            Some(0)
        } else {
            Some(self.registrations.get(&res.holder).map_or(0, |k| k.get()))
        }
    }

    fn is_holder(&self, nexus: NexusId) -> bool {
        match self.reservation {
            None => false,
            Some(res) if res.reservation_type.is_all_registrants() => {
                self.registrations.contains_key(&nexus)
            }
            Some(res) => res.holder == nexus,
        }
    }

    /// Checks the nexus is registered with exactly `key`.
    fn authorize(&self, nexus: NexusId, key: u64) -> Result<(), ScsiError> {
        match self.registrations.get(&nexus) {
            Some(k) if k.get() == key => Ok(()),
            _ => Err(ScsiError::ReservationConflict),
        }
    }

    /// Whether `nexus` may access the medium while the current reservation
    /// stands.
    pub fn check_access(&self, nexus: NexusId, access: Access) -> Result<(), ScsiError> {
        let Some(res) = self.reservation else {
            return Ok(());
        };
        if self.is_holder(nexus) {
            return Ok(());
        }
        let ty = res.reservation_type;
        let registrant = ty.is_registrants_only() && self.registrations.contains_key(&nexus);
        let allowed = match access {
            Access::Read => !ty.is_exclusive_access() || registrant,
            Access::Write => registrant,
        };
        if allowed {
            Ok(())
        } else {
            Err(ScsiError::ReservationConflict)
        }
    }

    fn drop_registration(&mut self, nexus: NexusId) {
        self.registrations.remove(&nexus);
        if let Some(res) = self.reservation {
            let released = if res.reservation_type.is_all_registrants() {
                self.registrations.is_empty()
            } else {
                res.holder == nexus
            };
            if released {
                self.reservation = None;
            }
        }
    }

    /// REGISTER and REGISTER AND IGNORE EXISTING KEY.
    pub fn register(
        &mut self,
        nexus: NexusId,
        key: u64,
        new_key: u64,
        ignore_existing: bool,
    ) -> Result<(), ScsiError> {
        let current = self.registrations.get(&nexus).map(|k| k.get());
        if !ignore_existing && current.unwrap_or(0) != key {
            return Err(ScsiError::ReservationConflict);
        }
        match (NonZeroU64::new(new_key), current) {
            (None, None) => return Ok(()),
            (None, Some(_)) => self.drop_registration(nexus),
            (Some(new_key), _) => {
                self.registrations.insert(nexus, new_key);
            }
        }
        self.generation += 1;
        Ok(())
    }

    pub fn reserve(
        &mut self,
        nexus: NexusId,
        key: u64,
        reservation_type: ReservationType,
    ) -> Result<(), ScsiError> {
        self.authorize(nexus, key)?;
        if !valid_type(reservation_type) {
            return Err(ScsiError::IllegalRequest(Ascq::INVALID_FIELD_IN_CDB));
        }
        match self.reservation {
            None => {
                self.reservation = Some(Reservation {
                    holder: nexus,
                    reservation_type,
                });
                Ok(())
            }
            Some(res) if res.reservation_type == reservation_type && self.is_holder(nexus) => {
                Ok(())
            }
            Some(_) => Err(ScsiError::ReservationConflict),
        }
    }

    /// Releases the reservation. A registered nexus that does not hold it
    /// gets success without effect.
    pub fn release(
        &mut self,
        nexus: NexusId,
        key: u64,
        reservation_type: ReservationType,
    ) -> Result<Notices, ScsiError> {
        self.authorize(nexus, key)?;
        let Some(res) = self.reservation else {
            return Ok(Vec::new());
        };
        if !self.is_holder(nexus) {
            return Ok(Vec::new());
        }
        if res.reservation_type != reservation_type {
            return Err(ScsiError::IllegalRequest(
                Ascq::INVALID_RELEASE_OF_PERSISTENT_RESERVATION,
            ));
        }
        self.reservation = None;
        let notices = if res.reservation_type.is_registrants_only() {
            self.others(nexus)
                .map(|n| (n, Ascq::RESERVATIONS_RELEASED))
                .collect()
        } else {
            Vec::new()
        };
        Ok(notices)
    }

    fn others(&self, nexus: NexusId) -> impl Iterator<Item = NexusId> + '_ {
        self.registrations.keys().copied().filter(move |&n| n != nexus)
    }

    pub fn clear(&mut self, nexus: NexusId, key: u64) -> Result<Notices, ScsiError> {
        self.authorize(nexus, key)?;
        let notices = self
            .others(nexus)
            .map(|n| (n, Ascq::RESERVATIONS_PREEMPTED))
            .collect();
        self.registrations.clear();
        self.reservation = None;
        self.generation += 1;
        Ok(notices)
    }

    /// PREEMPT. Removes every registration of `preempt_key` and, when that
    /// key holds the reservation, takes it over as `reservation_type`.
    pub fn preempt(
        &mut self,
        nexus: NexusId,
        key: u64,
        preempt_key: u64,
        reservation_type: ReservationType,
    ) -> Result<Notices, ScsiError> {
        self.authorize(nexus, key)?;
        let all_registrants = self
            .reservation
            .is_some_and(|res| res.reservation_type.is_all_registrants());

        let victims: Vec<NexusId> = if preempt_key == 0 {
            if !all_registrants {
                return Err(ScsiError::IllegalRequest(Ascq::INVALID_FIELD_IN_PARAMETER_LIST));
            }
            self.others(nexus).collect()
        } else {
            self.registrations
                .iter()
                .filter(|(&n, k)| n != nexus && k.get() == preempt_key)
                .map(|(&n, _)| n)
                .collect()
        };
        if victims.is_empty() && preempt_key != 0 {
            return Err(ScsiError::ReservationConflict);
        }

        let takes_over = match self.reservation {
            Some(_) if all_registrants => preempt_key == 0,
            Some(res) => victims.contains(&res.holder),
            None => false,
        };
        if takes_over && !valid_type(reservation_type) {
            return Err(ScsiError::IllegalRequest(Ascq::INVALID_FIELD_IN_CDB));
        }

        for victim in &victims {
            self.registrations.remove(victim);
        }
        if takes_over {
            self.reservation = Some(Reservation {
                holder: nexus,
                reservation_type,
            });
        }
        self.generation += 1;
        Ok(victims
            .into_iter()
            .map(|n| (n, Ascq::REGISTRATIONS_PREEMPTED))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: NexusId = NexusId(1);
    const B: NexusId = NexusId(2);

    #[test]
    fn strict_register_needs_current_key() {
        let mut state = ReservationState::default();
        state.register(A, 0, 5, false).unwrap();
        assert!(matches!(
            state.register(A, 0, 6, false),
            Err(ScsiError::ReservationConflict)
        ));
        state.register(A, 5, 6, false).unwrap();
        assert_eq!(state.keys(), [6]);
    }

    #[test]
    fn ignore_existing_is_idempotent() {
        let mut state = ReservationState::default();
        state.register(A, 0, 5, true).unwrap();
        state.register(A, 0, 5, true).unwrap();
        assert_eq!(state.keys(), [5]);
    }

    #[test]
    fn all_registrants_release_by_any() {
        let mut state = ReservationState::default();
        state.register(A, 0, 5, true).unwrap();
        state.register(B, 0, 6, true).unwrap();
        let ty = ReservationType::WRITE_EXCLUSIVE_ALL_REGISTRANTS;
        state.reserve(A, 5, ty).unwrap();
        assert_eq!(state.reservation_key(), Some(0));
        let notices = state.release(B, 6, ty).unwrap();
        assert_eq!(state.reservation(), None);
        assert_eq!(notices, [(A, Ascq::RESERVATIONS_RELEASED)]);
    }

    #[test]
    fn unregister_releases_held_reservation() {
        let mut state = ReservationState::default();
        state.register(A, 0, 5, true).unwrap();
        state.reserve(A, 5, ReservationType::EXCLUSIVE).unwrap();
        state.register(A, 5, 0, false).unwrap();
        assert_eq!(state.reservation(), None);
        assert!(!state.has_registrations());
    }

    #[test]
    fn access_by_type() {
        let mut state = ReservationState::default();
        state.register(A, 0, 5, true).unwrap();
        state.register(B, 0, 6, true).unwrap();
        state.reserve(A, 5, ReservationType::WRITE_EXCLUSIVE).unwrap();
        assert!(state.check_access(B, Access::Read).is_ok());
        assert!(state.check_access(B, Access::Write).is_err());
        assert!(state.check_access(A, Access::Write).is_ok());
    }

    #[test]
    fn preempt_takes_over() {
        let mut state = ReservationState::default();
        state.register(A, 0, 5, true).unwrap();
        state.register(B, 0, 6, true).unwrap();
        state.reserve(A, 5, ReservationType::EXCLUSIVE).unwrap();
        let notices = state
            .preempt(B, 6, 5, ReservationType::WRITE_EXCLUSIVE)
            .unwrap();
        assert_eq!(notices, [(A, Ascq::REGISTRATIONS_PREEMPTED)]);
        assert_eq!(
            state.reservation(),
            Some(Reservation {
                holder: B,
                reservation_type: ReservationType::WRITE_EXCLUSIVE
            })
        );
        assert_eq!(state.keys(), [6]);
    }
}
