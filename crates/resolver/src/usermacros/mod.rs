//! Hierarchical user macro resolution.
//!
//! Lookup order for each `{$MACRO}` token requested for an entity:
//!
//! 1. the entity's own hosts
//! 2. their templates, breadth-first by inheritance depth, each level in
//!    natural id order
//! 3. the global macro table (fetched at most once, only if needed)
//! 4. the token itself, echoed unchanged
//!
//! Host macro sets are loaded once per request and shared between all
//! entities of that request. Each entity walk keeps its own visited set,
//! so template cycles terminate.

mod parse;


use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use confmacro_core::{HostId, ResolverConfig};
use indexmap::IndexMap;

use crate::store::{or_empty, ConfigStore};
use crate::substitute::ResolvedMap;

pub use parse::{parse_user_macro, MacroContext, UserMacroName};
use parse::{build_table, lookup, LookupState, MacroTable};

/// User macro tokens to resolve for one entity, and the hosts to start from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMacroRequest {
    pub host_ids: Vec<HostId>,
    pub tokens: BTreeSet<String>,
}

struct LoadedHost {
    parents: Vec<HostId>,
    table: MacroTable,
}

struct PendingMacro {
    token: String,
    parsed: UserMacroName,
    state: LookupState,
}

struct EntityWalk {
    frontier: Vec<HostId>,
    visited: HashSet<HostId>,
    pending: Vec<PendingMacro>,
}

impl EntityWalk {
    fn active(&self) -> bool {
        !self.frontier.is_empty() && self.pending.iter().any(|p| !p.state.is_resolved())
    }
}

/// Request-scoped user macro resolver. Create one per resolution call.
pub struct UserMacroResolver<'a> {
    store: &'a dyn ConfigStore,
    config: &'a ResolverConfig,
    /// `None` marks ids the store does not know.
    loaded: HashMap<HostId, Option<LoadedHost>>,
    global: Option<MacroTable>,
}

impl<'a> UserMacroResolver<'a> {
    pub fn new(store: &'a dyn ConfigStore, config: &'a ResolverConfig) -> Self {
        Self {
            store,
            config,
            loaded: HashMap::new(),
            global: None,
        }
    }

    /// Resolve the tokens of a single host.
    pub async fn resolve_for_host(
        &mut self,
        host_id: &HostId,
        tokens: BTreeSet<String>,
    ) -> ResolvedMap {
        let mut requests = IndexMap::new();
        requests.insert(
            host_id.clone(),
            UserMacroRequest {
                host_ids: vec![host_id.clone()],
                tokens,
            },
        );
        self.resolve(requests).await.swap_remove(host_id).unwrap_or_default()
    }

    /// Resolve user macro tokens for many entities at once. Host macro sets
    /// of one inheritance level are fetched in a single batch across all
    /// entities.
    pub async fn resolve<K>(&mut self, requests: IndexMap<K, UserMacroRequest>) -> IndexMap<K, ResolvedMap>
    where
        K: Clone + Eq + Hash,
    {
        let mut walks: IndexMap<K, EntityWalk> = IndexMap::new();
        let mut results: IndexMap<K, ResolvedMap> = IndexMap::new();

        for (key, request) in requests {
            let mut resolved = ResolvedMap::new();
            let mut pending = Vec::new();
            for token in request.tokens {
                match parse_user_macro(&token, false) {
                    Some(parsed) => pending.push(PendingMacro {
                        token,
                        parsed,
                        state: LookupState::default(),
                    }),
                    None => resolved.insert(token.clone(), token),
                }
            }
            let mut frontier = request.host_ids;
            natsort_dedup(&mut frontier);
            walks.insert(
                key.clone(),
                EntityWalk {
                    frontier,
                    visited: HashSet::new(),
                    pending,
                },
            );
            results.insert(key, resolved);
        }

        let mut level = 0usize;
        while walks.values().any(EntityWalk::active) {
            let wanted: Vec<HostId> = walks
                .values()
                .filter(|w| w.active())
                .flat_map(|w| w.frontier.iter())
                .filter(|id| !self.loaded.contains_key(*id))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            self.load_hosts(&wanted, level).await;

            for walk in walks.values_mut().filter(|w| w.active()) {
                let mut next = Vec::new();
                for host_id in std::mem::take(&mut walk.frontier) {
                    if !walk.visited.insert(host_id.clone()) {
                        continue;
                    }
                    let Some(Some(host)) = self.loaded.get(&host_id) else {
                        continue;
                    };
                    for p in walk.pending.iter_mut().filter(|p| !p.state.is_resolved()) {
                        lookup(&host.table, &p.parsed, &mut p.state);
                    }
                    next.extend(
                        host.parents
                            .iter()
                            .filter(|id| !walk.visited.contains(*id))
                            .cloned(),
                    );
                }
                natsort_dedup(&mut next);
                walk.frontier = next;
            }
            level += 1;
        }

        let needs_global = walks
            .values()
            .any(|w| w.pending.iter().any(|p| !p.state.is_resolved()));
        if needs_global {
            let global = self.global_table().await;
            for walk in walks.values_mut() {
                for p in walk.pending.iter_mut().filter(|p| !p.state.is_resolved()) {
                    lookup(global, &p.parsed, &mut p.state);
                }
            }
        }

        for (key, walk) in walks {
            let Some(resolved) = results.get_mut(&key) else {
                continue;
            };
            for p in walk.pending {
                let value = p.state.value.or(p.state.default).unwrap_or_else(|| p.token.clone());
                resolved.insert(p.token, value);
            }
        }
        results
    }

    async fn load_hosts(&mut self, host_ids: &[HostId], level: usize) {
        if host_ids.is_empty() {
            return;
        }
        tracing::debug!(level, hosts = host_ids.len(), "Loading host macros");
        let mut sets = or_empty(self.store.host_macros(host_ids).await, "host_macros");
        for id in host_ids {
            let entry = sets.remove(id).map(|set| LoadedHost {
                parents: set.parent_template_ids,
                table: build_table(&set.macros, &self.config.secret_mask),
            });
            self.loaded.insert(id.clone(), entry);
        }
    }

    async fn global_table(&mut self) -> &MacroTable {
        if self.global.is_none() {
            tracing::debug!("Loading global macros");
            let defs = or_empty(self.store.global_macros().await, "global_macros");
            self.global = Some(build_table(&defs, &self.config.secret_mask));
        }
        self.global.get_or_insert_with(MacroTable::new)
    }
}

// ── Natural ordering ──────────────────────────────────────────

/// Sort ids so that digit runs compare numerically (`"9" < "10"`), then dedup.
pub(crate) fn natsort_dedup(ids: &mut Vec<HostId>) {
    ids.sort_by(|a, b| natural_cmp(a, b));
    ids.dedup();
}

pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied().filter(char::is_ascii_digit) {
        out.push(c);
        it.next();
    }
    out
}
