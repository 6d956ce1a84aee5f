// SPDX-License-Identifier: CEPL-1.0
//! Queue family resolution.
//!
//! Roles are resolved against the adapter's family list in index order. Several
//! roles may land on the same family; device creation asks for one queue per
//! *unique* family and every role then fetches queue 0 of its family.

use anyhow::Result;
use asterism_core::RenderError;
use bitflags::bitflags;
use std::fmt;
use tracing::info;

bitflags! {
    /// Capability bits a queue family advertises.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct QueueCaps: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Graphics work; the family must also be compute-capable.
    Graphics,
    Compute,
    /// Presentation to the window surface.
    Present,
}

impl QueueRole {
    fn required_caps(self) -> QueueCaps {
        match self {
            QueueRole::Graphics => QueueCaps::GRAPHICS | QueueCaps::COMPUTE,
            QueueRole::Compute => QueueCaps::COMPUTE,
            QueueRole::Present => QueueCaps::empty(),
        }
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueRole::Graphics => "graphics",
            QueueRole::Compute => "compute",
            QueueRole::Present => "present",
        })
    }
}

/// What one queue family offers, in the adapter's family order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub caps: QueueCaps,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilySet {
    entries: Vec<(QueueRole, u32)>,
}

impl QueueFamilySet {
    /// Resolves every role in `required` (plus `Present`, always) to a family.
    ///
    /// `present_support(i)` is asked, in index order, whether family `i` can
    /// present to the target surface; the first family that says yes wins.
    /// Fails with [`RenderError::MissingQueueRole`] naming the first role no
    /// family satisfies.
    pub fn resolve<F>(
        families: &[QueueFamilyInfo],
        required: &[QueueRole],
        mut present_support: F,
    ) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut roles: Vec<QueueRole> = Vec::with_capacity(required.len() + 1);
        for &role in required.iter().chain(std::iter::once(&QueueRole::Present)) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        let mut entries = Vec::with_capacity(roles.len());
        for role in roles {
            let found = match role {
                QueueRole::Present => {
                    let mut hit = None;
                    for i in 0..families.len() as u32 {
                        if present_support(i)? {
                            hit = Some(i);
                            break;
                        }
                    }
                    hit
                }
                _ => {
                    let need = role.required_caps();
                    families
                        .iter()
                        .position(|f| f.caps.contains(need))
                        .map(|i| i as u32)
                }
            };

            match found {
                Some(index) => entries.push((role, index)),
                None => return Err(RenderError::MissingQueueRole(role.to_string()).into()),
            }
        }

        let set = Self { entries };
        set.log();
        Ok(set)
    }

    pub fn family(&self, role: QueueRole) -> Option<u32> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|&(_, index)| index)
    }

    pub fn roles(&self) -> impl Iterator<Item = (QueueRole, u32)> + '_ {
        self.entries.iter().copied()
    }

    /// Distinct family indices, ascending. One device queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.entries.iter().map(|&(_, i)| i).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn log(&self) {
        let desc: Vec<String> = self
            .entries
            .iter()
            .map(|(role, index)| format!("{role}={index}"))
            .collect();
        info!("queue families: {}", desc.join(", "));
    }
}
