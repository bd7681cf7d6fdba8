//! Spatial planner.
//!
//! Pure functions that turn ordinal indices into world coordinates. The store
//! calls these exactly once, when an entity is created, and persists the
//! result; nothing downstream recomputes placement for existing entities.
//!
//! Coordinate system: `x` grows east, `z` grows south, `y` is height.

use serde::{Deserialize, Serialize};

use crate::entities::Group;
use crate::error::DomainError;

/// Ordinal reserved for the fixed hub at the world origin.
pub const HUB_ORDINAL: u32 = 0;

/// Height above `base_y` a building may occupy, cleared air included.
/// Track decks must sit above it, since tracks cross building cells.
pub const BUILDING_CLEARANCE: i32 = 8;

/// A column on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundPos {
    pub x: i32,
    pub z: i32,
}

impl GroundPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    pub fn at_height(self, y: i32) -> BlockPos {
        BlockPos::new(self.x, y, self.z)
    }
}

/// A single block in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// How buildings are arranged around their village centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberLayout {
    /// Square cells spiralling outward from the plaza, one building per cell.
    #[default]
    Grid,
    /// Evenly spaced slots on concentric rings.
    Ring,
}

/// Which villages a newly built village is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTopology {
    /// One track per village, to the hub (the oldest active village).
    #[default]
    HubAndSpoke,
    /// One track to every older active village.
    AllPairs,
}

/// Tunables for every placement formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Villages per grid row.
    pub grid_columns: u32,
    /// Distance between neighbouring village centres.
    pub village_spacing: i32,
    /// Ground level every structure is built on.
    pub base_y: i32,
    pub member_layout: MemberLayout,
    /// Width and depth of a building shell.
    pub building_footprint: i32,
    /// Minimum empty gap between neighbouring buildings.
    pub building_buffer: i32,
    /// Half-width of the open plaza at the village centre.
    pub plaza_radius: i32,
    pub ring_slots: u32,
    pub ring_radius: i32,
    pub ring_step: i32,
    /// Height of the track deck above `base_y`.
    pub track_height: i32,
    /// Every n-th track step gets a powered rail.
    pub boost_interval: u32,
    pub topology: LinkTopology,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_columns: 10,
            village_spacing: 240,
            base_y: 64,
            member_layout: MemberLayout::Grid,
            building_footprint: 9,
            building_buffer: 5,
            plaza_radius: 8,
            ring_slots: 8,
            ring_radius: 32,
            ring_step: 16,
            track_height: 10,
            boost_interval: 8,
            topology: LinkTopology::HubAndSpoke,
        }
    }
}

impl LayoutConfig {
    /// Edge length of one grid cell.
    pub fn cell_size(&self) -> i32 {
        self.building_footprint + self.building_buffer
    }

    pub fn track_y(&self) -> i32 {
        self.base_y + self.track_height
    }

    /// Reject layouts whose structures would overwrite each other.
    pub fn validate(&self) -> Result<(), DomainError> {
        // The deck is one block under the rails.
        if self.track_height - 1 <= BUILDING_CLEARANCE {
            return Err(DomainError::validation(format!(
                "track height {} leaves the deck inside building clearance {BUILDING_CLEARANCE}",
                self.track_height
            )));
        }
        Ok(())
    }
}

/// Village centre for an ordinal index.
pub fn group_center(ordinal: u32, config: &LayoutConfig) -> GroundPos {
    let columns = config.grid_columns.max(1);
    let col = (ordinal % columns) as i32;
    let row = (ordinal / columns) as i32;
    GroundPos::new(col * config.village_spacing, row * config.village_spacing)
}

/// Planned ground position of building `index` in the village at `center`.
pub fn member_position(center: GroundPos, index: u32, config: &LayoutConfig) -> GroundPos {
    let (dx, dz) = match config.member_layout {
        MemberLayout::Grid => grid_offset(index, config.cell_size()),
        MemberLayout::Ring => ring_offset(index, config),
    };
    center.offset(dx, dz)
}

/// Cell `index` on the square spiral around the plaza cell.
///
/// Ring `r` holds the `8r` cells at Chebyshev distance `r`; the first index of
/// ring `r` is `4r(r-1)`. Within a ring the walk goes along the north edge
/// eastward, then south, west and north again.
fn grid_offset(index: u32, cell: i32) -> (i32, i32) {
    let index = index as i64;
    let mut ring: i64 = 1;
    while 4 * ring * (ring + 1) <= index {
        ring += 1;
    }
    let k = index - 4 * ring * (ring - 1);
    let side_len = 2 * ring;
    let side = k / side_len;
    let off = k % side_len;
    let (i, j) = match side {
        0 => (-ring + off, -ring),
        1 => (ring, -ring + off),
        2 => (ring - off, ring),
        _ => (-ring, ring - off),
    };
    ((i as i32) * cell, (j as i32) * cell)
}

fn ring_offset(index: u32, config: &LayoutConfig) -> (i32, i32) {
    let slots = config.ring_slots.max(1);
    let ring = index / slots;
    let slot = index % slots;
    let radius = f64::from(config.ring_radius + ring as i32 * config.ring_step);
    let angle = f64::from(slot) * 360.0 / f64::from(slots);
    let rad = angle.to_radians();
    (
        (radius * rad.cos()).round() as i32,
        (radius * rad.sin()).round() as i32,
    )
}

/// Point on the track deck above a village centre, where its tracks meet.
pub fn station_position(center: GroundPos, config: &LayoutConfig) -> BlockPos {
    center.at_height(config.track_y())
}

/// Straight-line interpolation between two ground points, both ends included.
pub fn track_path(from: GroundPos, to: GroundPos) -> Vec<GroundPos> {
    let dx = to.x - from.x;
    let dz = to.z - from.z;
    let steps = dx.abs().max(dz.abs());
    if steps == 0 {
        return vec![from];
    }
    (0..=steps)
        .map(|t| {
            let x = from.x as f64 + dx as f64 * t as f64 / steps as f64;
            let z = from.z as f64 + dz as f64 * t as f64 / steps as f64;
            GroundPos::new(x.round() as i32, z.round() as i32)
        })
        .collect()
}

/// Whether track step `step` carries a boost marker.
pub fn is_boost_step(step: usize, interval: u32) -> bool {
    interval > 0 && step > 0 && step % interval as usize == 0
}

/// Villages a newly completed village must be linked to.
///
/// `active` is a snapshot of every active village, which may or may not
/// include `new_group` itself. Only villages with a lower ordinal are
/// targets, so each pair is linked once by its younger member no matter
/// which of the two finishes building first.
pub fn link_targets<'a>(
    new_group: &Group,
    active: &'a [Group],
    topology: LinkTopology,
) -> Vec<&'a Group> {
    match topology {
        LinkTopology::AllPairs => active
            .iter()
            .filter(|g| g.id != new_group.id && g.ordinal_index < new_group.ordinal_index)
            .collect(),
        LinkTopology::HubAndSpoke => {
            let hub = active
                .iter()
                .min_by_key(|g| g.ordinal_index)
                .filter(|hub| hub.ordinal_index < new_group.ordinal_index);
            match hub {
                Some(hub) if hub.id != new_group.id => vec![hub],
                _ => Vec::new(),
            }
        }
    }
}
