use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

pub type Slot = usize;

#[derive(Debug, Clone, Default)]
struct Scope {
    names: FxHashMap<SmolStr, Slot>,
    base: Slot,
}

/// Lexical scopes of one compilation, mapping names to slots of a single hoisted frame.
///
/// Slots freed by popping a scope are reused by its siblings; the high-water mark
/// is the frame size the compiled function allocates per invocation.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    next_slot: Slot,
    high_water: Slot,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self {
            scopes: vec![Scope::default()],
            next_slot: 0,
            high_water: 0,
        }
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope {
            names: FxHashMap::default(),
            base: self.next_slot,
        });
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1
            && let Some(scope) = self.scopes.pop()
        {
            self.next_slot = scope.base;
        }
    }

    /// Binds `name` in the innermost scope, reusing its slot when already bound there.
    pub fn declare(&mut self, name: &str) -> Slot {
        let next_slot = self.next_slot;
        let Some(scope) = self.scopes.last_mut() else {
            return next_slot;
        };

        if let Some(&slot) = scope.names.get(name) {
            return slot;
        }

        scope.names.insert(name.into(), next_slot);
        self.next_slot += 1;
        self.high_water = self.high_water.max(self.next_slot);
        next_slot
    }

    pub fn lookup(&self, name: &str) -> Option<Slot> {
        self.scopes.iter().rev().find_map(|scope| scope.names.get(name).copied())
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn slot_count(&self) -> usize {
        self.high_water
    }

    /// Grows the frame to hold slots allocated by a nested sub-scope.
    pub fn reserve(&mut self, slot_count: usize) {
        self.high_water = self.high_water.max(slot_count);
    }

    /// Visible bindings and the next free slot; two sub-scopes compiled under equal
    /// signatures address the same frame layout.
    pub fn signature(&self) -> String {
        let mut visible: FxHashMap<&SmolStr, Slot> = FxHashMap::default();
        for scope in &self.scopes {
            for (name, slot) in &scope.names {
                visible.insert(name, *slot);
            }
        }

        let bindings = visible
            .into_iter()
            .sorted()
            .map(|(name, slot)| format!("{}={}", name, slot))
            .join(",");
        format!("{}|{}", bindings, self.next_slot)
    }

    pub fn clear(&mut self) {
        self.scopes.truncate(1);
        self.scopes[0].names.clear();
        self.next_slot = 0;
        self.high_water = 0;
    }
}
