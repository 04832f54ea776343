//! Edge reconstruction from one process's call records

use crate::records::{FunctionCall, FunctionId};
use fnv::FnvHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Adjacency of the merged graph: caller → callees, both global ids
pub type EdgeMap = BTreeMap<u32, BTreeSet<u32>>;

/// Replays the call records of a single process into global edges
///
/// Stack-mode records are edges already. Entry/exit markers are replayed
/// against a shadow stack: an entry adds `top → callee` and pushes, an exit
/// unwinds through the nearest matching frame.
#[derive(Debug)]
pub struct CallReplay<'a> {
    local_to_global: &'a FnvHashMap<FunctionId, u32>,
    stack: Vec<u32>,
    skipped: usize,
}

impl<'a> CallReplay<'a> {
    pub fn new(local_to_global: &'a FnvHashMap<FunctionId, u32>) -> Self {
        Self {
            local_to_global,
            stack: Vec::new(),
            skipped: 0,
        }
    }

    pub fn apply(&mut self, call: &FunctionCall, edges: &mut EdgeMap) {
        if call.is_entry() {
            let Some(callee) = self.global(call.callee) else {
                return;
            };
            if let Some(&top) = self.stack.last() {
                edges.entry(top).or_default().insert(callee);
            }
            self.stack.push(callee);
        } else if call.is_exit() {
            let Some(callee) = self.global(call.caller) else {
                return;
            };
            if let Some(depth) = self.stack.iter().rposition(|&id| id == callee) {
                self.stack.truncate(depth);
            }
        } else {
            let (Some(caller), Some(callee)) = (self.global(call.caller), self.global(call.callee))
            else {
                return;
            };
            edges.entry(caller).or_default().insert(callee);
        }
    }

    /// Records dropped because they referenced unknown ids
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn global(&mut self, local: FunctionId) -> Option<u32> {
        let global = self.local_to_global.get(&local).copied();
        if global.is_none() {
            self.skipped += 1;
        }
        global
    }
}
