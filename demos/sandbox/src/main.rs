// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Quarry Sandbox
// Drives the resource cache the way a frame loop would: register fake
// textures, poll them resident, overflow the budget, and print stats.

use anyhow::Result;
use quarry_cache::ResourceCache;
use quarry_core::{EntryStatus, ResourceLoader};
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A fake texture; `decode_ms` stands in for the off-thread decode cost.
struct FakeTexture {
    name: &'static str,
    bytes: u64,
    decode_ms: u64,
}

struct FakeDecoder;

impl ResourceLoader<FakeTexture> for FakeDecoder {
    fn load(&self, data: &FakeTexture) -> Result<(), Box<dyn Error + Send + Sync>> {
        // Pretend to decode.
        thread::sleep(Duration::from_millis(data.decode_ms));
        log::debug!("decoded '{}'", data.name);
        Ok(())
    }

    fn store(&self, data: &FakeTexture) -> Result<u64, Box<dyn Error + Send + Sync>> {
        log::debug!("uploaded '{}' ({} bytes)", data.name, data.bytes);
        Ok(data.bytes)
    }

    fn evict(&self, data: &FakeTexture) {
        log::debug!("released '{}'", data.name);
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("debug")).init();

    let mut cache = ResourceCache::new(300, 2, Arc::new(FakeDecoder))?;

    let textures = [
        ("grass", 100, 5),
        ("rock", 100, 8),
        ("water", 100, 3),
        ("lava", 100, 6),
    ];
    let handles: Vec<_> = textures
        .iter()
        .map(|&(name, bytes, decode_ms)| {
            cache.register(
                Arc::new(FakeTexture {
                    name,
                    bytes,
                    decode_ms,
                }),
                0,
            )
        })
        .collect();

    // Frame loop: poll everything resident. The fourth texture pushes the
    // total past the budget, evicting the least recently used one.
    let mut frame = 0u32;
    loop {
        frame += 1;
        // Skip handles the trim already evicted; requesting one panics.
        let resident = handles
            .iter()
            .filter(|&&handle| {
                cache.status(handle).is_some() && cache.request(handle) == EntryStatus::Hit
            })
            .count();
        log::info!(
            "frame {frame}: {resident}/{} resident, {} bytes, {} load(s) in flight",
            handles.len(),
            cache.total_size(),
            cache.pending_loads()
        );
        // The budget only holds three textures, so stop once the
        // overflow eviction has actually happened.
        let evicted = cache.stats().evictions > 0;
        if (evicted && resident == handles.len() - 1) || frame > 100 {
            break;
        }
        thread::sleep(Duration::from_millis(4));
    }

    log::info!("stats: {:?}", cache.stats());
    cache.clear();
    Ok(())
}
