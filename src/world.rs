//! World Seed
//!
//! The demo host has no terrain; the containers players can turn into shops
//! come from a JSON file loaded at startup.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::container::{Holder, MemoryContainers, CONTAINER_SIZE};
use crate::item::ItemDescriptor;
use crate::location::BlockLocation;

#[derive(Debug, Clone, Deserialize)]
pub struct WorldSeed {
    #[serde(default)]
    pub containers: Vec<ContainerSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSeed {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub contents: Vec<StackSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackSeed {
    pub material: String,
    pub count: u32,
}

fn default_size() -> usize {
    CONTAINER_SIZE
}

/// Place every container described in `path`. Returns how many were placed.
pub fn load_world(path: &Path, containers: &MemoryContainers) -> Result<usize, String> {
    if !path.exists() {
        warn!("World file does not exist: {:?}", path);
        return Ok(0);
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    let seed: WorldSeed = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

    let mut placed = 0;
    for container in &seed.containers {
        let location = BlockLocation::new(&container.world, container.x, container.y, container.z);
        let holder = Holder::Container(location.clone());
        if !containers.place(holder.clone(), container.size) {
            warn!("Duplicate container at {} in {:?}, skipping", location, path);
            continue;
        }
        for stack in &container.contents {
            let leftover = containers.fill(&holder, &ItemDescriptor::new(&stack.material), stack.count);
            if leftover > 0 {
                warn!("{} {} did not fit into container at {}", leftover, stack.material, location);
            }
        }
        placed += 1;
    }

    info!("Placed {} containers from {:?}", placed, path);
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerService;
    use tempfile::TempDir;

    #[test]
    fn test_load_world() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("world.json");
        std::fs::write(
            &path,
            r#"{
                "containers": [
                    { "world": "world", "x": 10, "y": 64, "z": -20,
                      "contents": [ { "material": "oak_log", "count": 100 } ] },
                    { "world": "world", "x": 10, "y": 64, "z": -20 },
                    { "world": "world", "x": 0, "y": 64, "z": 0, "size": 9 }
                ]
            }"#,
        )
        .unwrap();

        let containers = MemoryContainers::new();
        assert_eq!(load_world(&path, &containers).unwrap(), 2);

        let chest = Holder::Container(BlockLocation::new("world", 10, 64, -20));
        assert_eq!(containers.count_matching(&chest, &ItemDescriptor::new("oak_log")), 100);
        let small = Holder::Container(BlockLocation::new("world", 0, 64, 0));
        assert_eq!(containers.read(&small).unwrap().len(), 9);
    }

    #[test]
    fn test_missing_world_file() {
        let temp_dir = TempDir::new().unwrap();
        let containers = MemoryContainers::new();
        assert_eq!(load_world(&temp_dir.path().join("none.json"), &containers).unwrap(), 0);
        assert!(containers.is_empty());
    }
}
