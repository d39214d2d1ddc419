// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Storage and activation of parameter sets.

use std::collections::BTreeMap;
use std::rc::Rc;

use bytes::Bytes;
use thiserror::Error;

use crate::codec::h266::parameter_sets::ActiveParameterSets;
use crate::codec::h266::parameter_sets::Aps;
use crate::codec::h266::parameter_sets::ApsType;
use crate::codec::h266::parameter_sets::ParameterSet;
use crate::codec::h266::parameter_sets::Pps;
use crate::codec::h266::parameter_sets::Sps;
use crate::codec::h266::parameter_sets::Vps;
use crate::codec::h266::parameter_sets::MAX_NUM_APS;
use crate::codec::h266::parameter_sets::MAX_NUM_APS_TYPE;
use crate::codec::h266::parameter_sets::MAX_NUM_PPS;
use crate::codec::h266::parameter_sets::MAX_NUM_SPS;
use crate::codec::h266::parameter_sets::MAX_NUM_VPS;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} id {id} is out of range, at most {max} ids can be stored")]
    IdOutOfRange {
        kind: &'static str,
        id: usize,
        max: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("trying to activate PPS {0}, which does not exist")]
    MissingPps(u8),
    #[error("PPS {pps_id} refers to SPS {sps_id}, which does not exist")]
    MissingSps { pps_id: u8, sps_id: u8 },
    #[error("PPS {pps_id} switches to SPS {sps_id} at a picture that is not IRAP")]
    SpsChangeAtNonIrap { pps_id: u8, sps_id: u8 },
    #[error("trying to activate {aps_type:?} APS {aps_id}, which does not exist")]
    MissingAps { aps_id: u8, aps_type: ApsType },
}

#[derive(Debug)]
struct MapEntry<T> {
    ps: Rc<T>,
    /// Payload as it was received, used to detect content changes.
    raw: Option<Bytes>,
    changed: bool,
}

/// A table of parameter sets of one kind, keyed by id.
#[derive(Debug)]
pub struct ParameterSetMap<T> {
    entries: BTreeMap<usize, MapEntry<T>>,
    max_id: usize,
    /// Ids activated since the last call to `clear_active`, in activation order.
    active: Vec<usize>,
    /// Previous content of an active id that got overwritten.
    last_active: Option<Rc<T>>,
}

impl<T: ParameterSet> ParameterSetMap<T> {
    pub fn new(max_id: usize) -> Self {
        Self {
            entries: Default::default(),
            max_id,
            active: Default::default(),
            last_active: None,
        }
    }

    fn check_id(&self, id: usize) -> Result<(), StoreError> {
        if id >= self.max_id {
            return Err(StoreError::IdOutOfRange {
                kind: T::KIND,
                id,
                max: self.max_id,
            });
        }

        Ok(())
    }

    /// Stores `ps` under its own id.
    ///
    /// A parameter set received again with the same raw payload is dropped and the stored one is
    /// kept. Otherwise the previous content is replaced and the changed flag of the id is raised
    /// until `clear_changed` is called.
    pub fn store(&mut self, ps: T, raw: Option<Bytes>) -> Result<(), StoreError> {
        let id = ps.id();
        self.check_id(id)?;

        let ps = Rc::new(ps);
        match self.entries.get_mut(&id) {
            Some(entry) => {
                let changed = entry.raw != raw;
                if !changed && raw.is_some() {
                    log::trace!("{} {} is unchanged", T::KIND, id);
                    return Ok(());
                }

                if self.active.contains(&id) {
                    self.last_active = Some(Rc::clone(&entry.ps));
                }

                entry.changed |= changed;
                entry.raw = raw;
                entry.ps = ps;
            }
            None => {
                self.entries.insert(
                    id,
                    MapEntry {
                        ps,
                        raw,
                        changed: true,
                    },
                );
            }
        }

        log::trace!("Stored {} {}", T::KIND, id);
        Ok(())
    }

    /// Returns the parameter set stored under `id`, creating a default one if the id is empty.
    pub fn allocate(&mut self, id: usize) -> Result<Rc<T>, StoreError> {
        self.check_id(id)?;

        let entry = self.entries.entry(id).or_insert_with(|| {
            log::debug!("Allocating placeholder {} {}", T::KIND, id);
            let mut ps = T::default();
            ps.set_id(id);
            MapEntry {
                ps: Rc::new(ps),
                raw: None,
                changed: true,
            }
        });

        Ok(Rc::clone(&entry.ps))
    }

    pub fn get(&self, id: usize) -> Option<&Rc<T>> {
        self.entries.get(&id).map(|entry| &entry.ps)
    }

    /// The parameter set with the lowest id.
    pub fn first(&self) -> Option<&Rc<T>> {
        self.entries.values().next().map(|entry| &entry.ps)
    }

    /// Raw payload the parameter set under `id` was stored with.
    pub fn raw(&self, id: usize) -> Option<&Bytes> {
        self.entries.get(&id).and_then(|entry| entry.raw.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn changed(&self, id: usize) -> bool {
        self.entries.get(&id).map_or(false, |entry| entry.changed)
    }

    pub fn set_changed(&mut self, id: usize) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.changed = true;
        }
    }

    pub fn clear_changed(&mut self, id: usize) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.changed = false;
        }
    }

    pub fn set_active(&mut self, id: usize) {
        if !self.active.contains(&id) {
            self.active.push(id);
        }
    }

    pub fn is_active(&self, id: usize) -> bool {
        self.active.contains(&id)
    }

    /// The parameter set activated first since the last call to `clear_active`.
    pub fn active(&self) -> Option<&Rc<T>> {
        self.active.first().and_then(|id| self.get(*id))
    }

    /// Forgets which ids are active. Stored content is kept.
    pub fn clear_active(&mut self) {
        self.active.clear();
    }

    /// Content of an active id before it was overwritten by `store`.
    pub fn last_active(&self) -> Option<&Rc<T>> {
        self.last_active.as_ref()
    }
}

/// Owns the VPS, SPS, PPS and APS tables and tracks which of their entries are in effect.
#[derive(Debug)]
pub struct ParameterSetManager {
    vps_map: ParameterSetMap<Vps>,
    sps_map: ParameterSetMap<Sps>,
    pps_map: ParameterSetMap<Pps>,
    aps_map: ParameterSetMap<Aps>,
    active_vps_id: Option<u8>,
    active_sps_id: Option<u8>,
    /// Whether the SPS may change at pictures that are not IRAP.
    multi_sps: bool,
}

impl Default for ParameterSetManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ParameterSetManager {
    pub fn new(multi_sps: bool) -> Self {
        Self {
            vps_map: ParameterSetMap::new(MAX_NUM_VPS),
            sps_map: ParameterSetMap::new(MAX_NUM_SPS),
            pps_map: ParameterSetMap::new(MAX_NUM_PPS),
            aps_map: ParameterSetMap::new(MAX_NUM_APS * MAX_NUM_APS_TYPE),
            active_vps_id: None,
            active_sps_id: None,
            multi_sps,
        }
    }

    pub fn store_vps(&mut self, vps: Vps, raw: Option<Bytes>) -> Result<(), StoreError> {
        self.vps_map.store(vps, raw)
    }

    pub fn store_sps(&mut self, sps: Sps, raw: Option<Bytes>) -> Result<(), StoreError> {
        self.sps_map.store(sps, raw)
    }

    pub fn store_pps(&mut self, pps: Pps, raw: Option<Bytes>) -> Result<(), StoreError> {
        self.pps_map.store(pps, raw)
    }

    pub fn store_aps(&mut self, aps: Aps, raw: Option<Bytes>) -> Result<(), StoreError> {
        self.aps_map.store(aps, raw)
    }

    pub fn vps(&self, vps_id: u8) -> Option<&Rc<Vps>> {
        self.vps_map.get(usize::from(vps_id))
    }

    pub fn sps(&self, sps_id: u8) -> Option<&Rc<Sps>> {
        self.sps_map.get(usize::from(sps_id))
    }

    pub fn pps(&self, pps_id: u8) -> Option<&Rc<Pps>> {
        self.pps_map.get(usize::from(pps_id))
    }

    pub fn aps(&self, aps_id: u8, aps_type: ApsType) -> Option<&Rc<Aps>> {
        self.aps_map.get(Aps::key(aps_id, aps_type))
    }

    pub fn vps_map(&self) -> &ParameterSetMap<Vps> {
        &self.vps_map
    }

    pub fn sps_map(&self) -> &ParameterSetMap<Sps> {
        &self.sps_map
    }

    pub fn pps_map(&self) -> &ParameterSetMap<Pps> {
        &self.pps_map
    }

    pub fn aps_map(&self) -> &ParameterSetMap<Aps> {
        &self.aps_map
    }

    pub fn sps_map_mut(&mut self) -> &mut ParameterSetMap<Sps> {
        &mut self.sps_map
    }

    pub fn pps_map_mut(&mut self) -> &mut ParameterSetMap<Pps> {
        &mut self.pps_map
    }

    pub fn aps_map_mut(&mut self) -> &mut ParameterSetMap<Aps> {
        &mut self.aps_map
    }

    pub fn active_vps_id(&self) -> Option<u8> {
        self.active_vps_id
    }

    pub fn active_sps_id(&self) -> Option<u8> {
        self.active_sps_id
    }

    pub fn active_vps(&self) -> Option<&Rc<Vps>> {
        self.active_vps_id.and_then(|id| self.vps(id))
    }

    pub fn active_sps(&self) -> Option<&Rc<Sps>> {
        self.active_sps_id.and_then(|id| self.sps(id))
    }

    pub fn active_pps(&self) -> Option<&Rc<Pps>> {
        self.pps_map.active()
    }

    pub fn active_aps(&self, aps_id: u8, aps_type: ApsType) -> Option<&Rc<Aps>> {
        let key = Aps::key(aps_id, aps_type);
        if self.aps_map.is_active(key) {
            self.aps_map.get(key)
        } else {
            None
        }
    }

    /// The SPS, PPS and, if present, VPS currently in effect.
    pub fn active_parameter_sets(&self) -> Option<ActiveParameterSets> {
        Some(ActiveParameterSets {
            vps: self.active_vps().cloned(),
            sps: Rc::clone(self.active_sps()?),
            pps: Rc::clone(self.active_pps()?),
        })
    }

    /// Makes PPS `pps_id` and the SPS it refers to the active ones.
    ///
    /// VPS 0 is implied for single-layer streams and gets a default placeholder if it was never
    /// received. A missing non-zero VPS is only reported. On failure the active SPS is reset.
    pub fn try_activate_pps(&mut self, pps_id: u8, is_irap: bool) -> Result<(), ActivationError> {
        let result = self.activate_pps_inner(pps_id, is_irap);
        if result.is_err() {
            self.active_sps_id = None;
        }
        result
    }

    fn activate_pps_inner(&mut self, pps_id: u8, is_irap: bool) -> Result<(), ActivationError> {
        let pps = self
            .pps(pps_id)
            .cloned()
            .ok_or(ActivationError::MissingPps(pps_id))?;
        let sps_id = pps.sps_id;

        if !self.multi_sps && !is_irap && Some(sps_id) != self.active_sps_id {
            return Err(ActivationError::SpsChangeAtNonIrap { pps_id, sps_id });
        }

        let sps = self
            .sps(sps_id)
            .cloned()
            .ok_or(ActivationError::MissingSps { pps_id, sps_id })?;

        let vps_id = sps.vps_id;
        if vps_id != 0 {
            if self.vps(vps_id).is_some() {
                self.vps_map.clear_active();
                self.vps_map.set_active(usize::from(vps_id));
                self.active_vps_id = Some(vps_id);
            } else {
                log::warn!("SPS {} refers to VPS {}, which does not exist", sps_id, vps_id);
            }
        } else {
            self.vps_map.clear_active();
            // Id 0 is always in range.
            let _ = self.vps_map.allocate(0);
            self.vps_map.set_active(0);
            self.active_vps_id = Some(0);
        }

        self.sps_map.clear_active();
        self.sps_map.set_active(usize::from(sps_id));
        self.active_sps_id = Some(sps_id);

        self.pps_map.clear_active();
        self.pps_map.set_active(usize::from(pps_id));

        log::debug!("Activated PPS {} with SPS {} and VPS {}", pps_id, sps_id, vps_id);
        Ok(())
    }

    /// Like [`ParameterSetManager::try_activate_pps`], but only reports failures through the log.
    pub fn activate_pps(&mut self, pps_id: u8, is_irap: bool) -> bool {
        match self.try_activate_pps(pps_id, is_irap) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }

    /// Marks APS `aps_id` of type `aps_type` as active.
    pub fn try_activate_aps(
        &mut self,
        aps_id: u8,
        aps_type: ApsType,
    ) -> Result<(), ActivationError> {
        let key = Aps::key(aps_id, aps_type);
        if self.aps_map.get(key).is_none() {
            return Err(ActivationError::MissingAps { aps_id, aps_type });
        }

        self.aps_map.set_active(key);
        Ok(())
    }

    pub fn activate_aps(&mut self, aps_id: u8, aps_type: ApsType) -> bool {
        match self.try_activate_aps(aps_id, aps_type) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }
}
