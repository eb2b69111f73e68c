// Copyright 2025 jonefeewang@gmail.com
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

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;

/// Live connections by id. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<u64, SocketAddr>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry::default()
    }

    pub fn register(&self, id: u64, addr: SocketAddr) {
        self.connections.insert(id, addr);
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: u64) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn peers(&self) -> Vec<(u64, SocketAddr)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}
