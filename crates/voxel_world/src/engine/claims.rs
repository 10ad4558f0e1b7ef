//! Land claims and the layered permission model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geometry::{in_day_window, manhattan_xz, Vec3i};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClaimFlags {
    pub allow_build: bool,
    pub allow_break: bool,
    pub allow_damage: bool,
    pub allow_trade: bool,
}

/// A claimed disc of land (Manhattan metric on the ground plane).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandClaim {
    pub land_id: String,
    /// Agent id or org id.
    pub owner: String,
    pub anchor: Vec3i,
    pub radius: i32,
    pub flags: ClaimFlags,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, bool>,

    pub market_tax: f64,
    pub curfew_enabled: bool,
    pub curfew_start: f64,
    pub curfew_end: f64,

    // FINE_BREAK_PER_BLOCK law state, consulted at action time.
    #[serde(default)]
    pub fine_break_enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fine_break_item: String,
    #[serde(default)]
    pub fine_break_per_block: i64,

    // ACCESS_PASS_CORE law state, consulted at action time.
    #[serde(default)]
    pub access_pass_enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_ticket_item: String,
    #[serde(default)]
    pub access_ticket_cost: i64,

    /// 0 = paid, 1 = late (no expansion), 2 = unprotected.
    #[serde(default)]
    pub maintenance_stage: i32,
    #[serde(default)]
    pub maintenance_due_tick: u64,
}

impl LandClaim {
    pub fn contains(&self, pos: Vec3i) -> bool {
        manhattan_xz(pos, self.anchor) <= self.radius
    }
}

/// Capability set resolved for an agent at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub can_build: bool,
    pub can_break: bool,
    pub can_damage: bool,
    pub can_trade: bool,
}

impl Permissions {
    /// The unclaimed-wilderness policy.
    pub fn wild() -> Self {
        Self {
            can_build: true,
            can_break: true,
            can_damage: false,
            can_trade: true,
        }
    }

    pub fn member(flags: ClaimFlags) -> Self {
        Self {
            can_build: true,
            can_break: true,
            can_damage: flags.allow_damage,
            can_trade: true,
        }
    }

    pub fn visitor(flags: ClaimFlags) -> Self {
        Self {
            can_build: flags.allow_build,
            can_break: flags.allow_break,
            can_damage: flags.allow_damage,
            can_trade: flags.allow_trade,
        }
    }

    pub fn to_map(self) -> BTreeMap<String, bool> {
        BTreeMap::from([
            ("can_build".to_string(), self.can_build),
            ("can_break".to_string(), self.can_break),
            ("can_damage".to_string(), self.can_damage),
            ("can_trade".to_string(), self.can_trade),
        ])
    }
}

/// Resolves the visitor/member capability set for `agent_id` at `pos` given
/// the claim containing it (if any). Curfew is layered on top by the
/// `can_build_at`/`can_break_at` specializations on the world.
pub fn resolve_permissions(
    claim: Option<&LandClaim>,
    is_member: impl Fn(&LandClaim) -> bool,
) -> Permissions {
    let Some(claim) = claim else {
        return Permissions::wild();
    };
    if is_member(claim) {
        return Permissions::member(claim.flags);
    }
    // Unmaintained land degrades to wilderness rules for visitors.
    if claim.maintenance_stage >= 2 {
        return Permissions::wild();
    }
    Permissions::visitor(claim.flags)
}

/// Whether curfew currently forbids building and breaking for visitors.
pub fn curfew_blocks(claim: &LandClaim, time_of_day: f64) -> bool {
    claim.curfew_enabled && in_day_window(time_of_day, claim.curfew_start, claim.curfew_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> LandClaim {
        LandClaim {
            land_id: "LAND_A1_001".to_string(),
            owner: "A1".to_string(),
            anchor: Vec3i::new(0, 1, 0),
            radius: 8,
            flags: ClaimFlags::default(),
            members: BTreeMap::new(),
            market_tax: 0.0,
            curfew_enabled: false,
            curfew_start: 0.0,
            curfew_end: 0.0,
            fine_break_enabled: false,
            fine_break_item: String::new(),
            fine_break_per_block: 0,
            access_pass_enabled: false,
            access_ticket_item: String::new(),
            access_ticket_cost: 0,
            maintenance_stage: 0,
            maintenance_due_tick: 0,
        }
    }

    #[test]
    fn containment_is_manhattan_disc() {
        let c = claim();
        assert!(c.contains(Vec3i::new(4, 1, 4)));
        assert!(!c.contains(Vec3i::new(5, 1, 4)));
        // y never matters for containment.
        assert!(c.contains(Vec3i::new(0, 40, 8)));
    }

    #[test]
    fn maintenance_downgrade_gives_visitors_wild_rules() {
        let mut c = claim();
        c.flags = ClaimFlags {
            allow_build: false,
            allow_break: false,
            allow_damage: false,
            allow_trade: false,
        };
        let p = resolve_permissions(Some(&c), |_| false);
        assert!(!p.can_build && !p.can_break);

        c.maintenance_stage = 2;
        let p = resolve_permissions(Some(&c), |_| false);
        assert!(p.can_build && p.can_break && p.can_trade);
    }

    #[test]
    fn members_get_full_permissions() {
        let c = claim();
        let p = resolve_permissions(Some(&c), |_| true);
        assert!(p.can_build && p.can_break && p.can_trade);
    }
}
