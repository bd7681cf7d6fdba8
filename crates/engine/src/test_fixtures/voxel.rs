//! Tiny block world that understands `fill` and `setblock`, so generator
//! output can be checked block by block.

use std::collections::{BTreeMap, HashSet};

use crate::use_cases::construction::blocks::MAX_FILL_VOLUME;

pub type Pos = (i32, i32, i32);

/// Sparse world; anything not stored is air.
#[derive(Debug, Default, Clone)]
pub struct VoxelWorld {
    blocks: BTreeMap<Pos, String>,
}

impl VoxelWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command. Rejects anything the real server would refuse.
    pub fn apply(&mut self, command: &str) -> Result<(), String> {
        let body = command
            .strip_suffix(" replace")
            .ok_or_else(|| format!("missing mode: {command}"))?;

        if let Some(rest) = body.strip_prefix("fill ") {
            let parts: Vec<&str> = rest.splitn(7, ' ').collect();
            if parts.len() != 7 {
                return Err(format!("short fill: {command}"));
            }
            let n = numbers(&parts[..6])?;
            let (x0, x1) = (n[0].min(n[3]), n[0].max(n[3]));
            let (y0, y1) = (n[1].min(n[4]), n[1].max(n[4]));
            let (z0, z1) = (n[2].min(n[5]), n[2].max(n[5]));
            let volume = i64::from(x1 - x0 + 1) * i64::from(y1 - y0 + 1) * i64::from(z1 - z0 + 1);
            if volume > MAX_FILL_VOLUME {
                return Err(format!("fill of {volume} blocks: {command}"));
            }
            for x in x0..=x1 {
                for y in y0..=y1 {
                    for z in z0..=z1 {
                        self.set((x, y, z), parts[6]);
                    }
                }
            }
            Ok(())
        } else if let Some(rest) = body.strip_prefix("setblock ") {
            let parts: Vec<&str> = rest.splitn(4, ' ').collect();
            if parts.len() != 4 {
                return Err(format!("short setblock: {command}"));
            }
            let n = numbers(&parts[..3])?;
            self.set((n[0], n[1], n[2]), parts[3]);
            Ok(())
        } else {
            Err(format!("unknown command: {command}"))
        }
    }

    fn set(&mut self, at: Pos, block: &str) {
        if block == "air" {
            self.blocks.remove(&at);
        } else {
            self.blocks.insert(at, block.to_string());
        }
    }

    pub fn block(&self, x: i32, y: i32, z: i32) -> Option<&str> {
        self.blocks.get(&(x, y, z)).map(String::as_str)
    }

    pub fn snapshot(&self) -> BTreeMap<Pos, String> {
        self.blocks.clone()
    }

    /// Ground columns holding at least one non-air block.
    pub fn solid_columns(&self) -> HashSet<(i32, i32)> {
        self.blocks.keys().map(|(x, _, z)| (*x, *z)).collect()
    }
}

fn numbers(parts: &[&str]) -> Result<Vec<i32>, String> {
    parts
        .iter()
        .map(|p| p.parse::<i32>().map_err(|e| format!("bad coordinate {p}: {e}")))
        .collect()
}
