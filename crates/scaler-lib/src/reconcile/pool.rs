//! Capacity pool planning
//!
//! | period | live max vs target     | update                                   |
//! |--------|------------------------|------------------------------------------|
//! | night  | max >= floor           | desired = min = floor                    |
//! | night  | max <  floor           | desired = min = max = floor              |
//! | day    | max <  declared desired| desired = min = declared, max = declared max |
//! | day    | otherwise              | desired = min = declared                 |
//!
//! A max raised by the second row stays raised until the third row fires.

use serde::{Deserialize, Serialize};

use crate::models::{CapacitySnapshot, CapacityUpdate};
use crate::resolve::DeclaredCapacity;
use crate::schedule::TimePeriod;

/// Which row of the pool table produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolBranch {
    NightDescale,
    NightWidenMax,
    DayRestoreMax,
    DayScale,
}

impl PoolBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolBranch::NightDescale => "night_descale",
            PoolBranch::NightWidenMax => "night_widen_max",
            PoolBranch::DayRestoreMax => "day_restore_max",
            PoolBranch::DayScale => "day_scale",
        }
    }
}

/// Planned update of one scaling group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPlan {
    pub group_name: String,
    pub period: TimePeriod,
    pub branch: PoolBranch,
    pub live: CapacitySnapshot,
    /// Every field the table row sets, before minimization
    pub update: CapacityUpdate,
}

impl PoolPlan {
    /// Fields that actually differ from the live group
    pub fn changes(&self) -> CapacityUpdate {
        self.update.minimize(self.live)
    }

    /// Group size after the plan is applied
    pub fn target(&self) -> CapacitySnapshot {
        self.update.apply_to(self.live)
    }

    pub fn is_noop(&self) -> bool {
        self.changes().is_empty()
    }
}

/// Pick the table row and build the field update
pub fn plan_pool(
    group_name: &str,
    period: TimePeriod,
    live: CapacitySnapshot,
    declared: DeclaredCapacity,
    night_floor: u32,
) -> PoolPlan {
    let (branch, update) = match period {
        TimePeriod::Night if live.max >= night_floor => (
            PoolBranch::NightDescale,
            CapacityUpdate {
                min: Some(night_floor),
                max: None,
                desired: Some(night_floor),
            },
        ),
        TimePeriod::Night => (
            PoolBranch::NightWidenMax,
            CapacityUpdate {
                min: Some(night_floor),
                max: Some(night_floor),
                desired: Some(night_floor),
            },
        ),
        TimePeriod::Day if live.max < declared.desired => (
            PoolBranch::DayRestoreMax,
            CapacityUpdate {
                min: Some(declared.desired),
                max: Some(declared.max),
                desired: Some(declared.desired),
            },
        ),
        TimePeriod::Day => (
            PoolBranch::DayScale,
            CapacityUpdate {
                min: Some(declared.desired),
                max: None,
                desired: Some(declared.desired),
            },
        ),
    };

    PoolPlan {
        group_name: group_name.to_string(),
        period,
        branch,
        live,
        update,
    }
}
