use std::collections::HashMap;

use confmacro_core::{
    AggregateFunction, FunctionHost, FunctionId, FunctionInterface, FunctionItem, HostMacroSet,
    HostRecord, InterfaceRecord, InterfaceType, ItemHost, ItemMeta, ItemSample, MacroDefinition,
    StoreError,
};

use super::*;
use crate::memory::MemoryStore;
use crate::request::GraphItem;
use crate::store::HostKey;

const SNAPSHOT: &str = r#"
now: 2000
hosts:
  - id: "10"
    host: web01
    name: Web server
    templates: ["1"]
    macros:
      - { macro: "{$AGENT_IP}", value: 192.168.1.10 }
      - { macro: "{$PAIR}", value: "a,b" }
  - id: "20"
    host: db01
  - id: "30"
    host: edge01
  - id: "1"
    host: Template OS
    macros:
      - { macro: "{$LIMIT}", value: "90" }
interfaces:
  - { host_id: "10", type: agent, ip: "{$AGENT_IP}", dns: "{HOST.HOST}.lan", port: "10050" }
  - { host_id: "20", interface_id: "21", type: snmp, ip: 10.0.0.20, dns: db01.lan, port: "161" }
  - { host_id: "20", interface_id: "22", type: jmx, ip: 10.0.0.21, port: "12345" }
  - { host_id: "30", type: agent, ip: "{$NOWHERE_IP}", dns: edge01.lan }
items:
  - { id: "100", host_id: "10", key: cpu.load, value_type: float }
  - { id: "110", host_id: "10", key: secret.load, value_type: float, web_visible: false }
  - { id: "200", host_id: "20", key: mysql.status, value_type: uint64, valuemap_id: 4 }
  - { id: "300", host_id: "20", key: jmx.heap, value_type: float, interface_id: "22" }
value_maps:
  - id: 4
    mappings: { "1": Up, "0": Down }
triggers:
  - id: "500"
    functions:
      - { id: "1", item_id: "100" }
      - { id: "2", item_id: "200" }
history:
  - { item_id: "100", clock: 1900, value: "1.5" }
  - { item_id: "100", clock: 1990, value: "4.25" }
  - { item_id: "110", clock: 1990, value: "7" }
  - { item_id: "200", clock: 1000, value: "1" }
  - { item_id: "200", clock: 1500, value: "0" }
"#;

fn setup() -> (Arc<MemoryStore>, MacroResolver) {
    let store = Arc::new(MemoryStore::from_yaml_str(SNAPSHOT).unwrap());
    let resolver = MacroResolver::with_store(store.clone(), ResolverConfig::default());
    (store, resolver)
}

fn texts(entries: &[(&str, &[&str])]) -> IndexMap<HostId, Vec<String>> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn host_macro_ids(store: &MemoryStore) -> Vec<String> {
    store
        .calls()
        .into_iter()
        .filter(|c| c.method == "host_macros")
        .flat_map(|c| c.ids)
        .collect()
}

fn assert_no_repeats(ids: &[String]) {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        assert!(seen.insert(id), "host {id} fetched twice in {ids:?}");
    }
}

fn item(item_id: &str, host_id: &str, name: &str, key: &str) -> ItemRecord {
    ItemRecord {
        item_id: item_id.into(),
        host_id: host_id.into(),
        name: name.into(),
        key: key.into(),
        key_expanded: None,
    }
}

fn trigger(expression: &str, description: &str) -> IndexMap<TriggerId, TriggerRecord> {
    let mut m = IndexMap::new();
    m.insert("500".to_string(), TriggerRecord::new(expression, description));
    m
}

// ── Dispatch ──────────────────────────────────────────────────

#[tokio::test]
async fn empty_inputs_make_no_calls() {
    let (store, resolver) = setup();
    let out = resolver
        .resolve_named(
            "scriptConfirmation",
            MacroInputs::Texts(IndexMap::new()),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert!(out.is_empty());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn unknown_scenario_is_rejected() {
    let (_, resolver) = setup();
    let err = resolver
        .resolve_named("mapLabel", MacroInputs::Texts(IndexMap::new()), ResolveOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, ResolveError::UnknownScenario("mapLabel".into()));
}

#[tokio::test]
async fn mismatched_input_kind_is_rejected() {
    let (_, resolver) = setup();
    let err = resolver
        .resolve(ResolutionRequest {
            scenario: Scenario::GraphName,
            inputs: MacroInputs::Texts(texts(&[("10", &["x"])])),
            options: ResolveOptions::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::InputMismatch { expected: "graphs", .. }));

    let err = resolver
        .resolve_named(
            "functionParameter",
            MacroInputs::Items(IndexMap::new()),
            ResolveOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::InputMismatch { expected: "functions", .. }));
}

#[tokio::test]
async fn zero_nesting_depth_is_raised_to_one() {
    let store = Arc::new(MemoryStore::from_yaml_str(SNAPSHOT).unwrap());
    let config = ResolverConfig {
        max_nesting_depth: 0,
        ..ResolverConfig::default()
    };
    let resolver = MacroResolver::with_store(store, config);
    assert_eq!(resolver.config().max_nesting_depth, 1);
    let out = resolver
        .resolve_texts(Scenario::HostInterfacePort, texts(&[("10", &["{$LIMIT}"])]))
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["90"]);
}

// ── Text scenarios ────────────────────────────────────────────

#[tokio::test]
async fn script_confirmation_resolves_host_interface_and_user() {
    let (_, resolver) = setup();
    let out = resolver
        .resolve_texts(
            Scenario::ScriptConfirmation,
            texts(&[
                ("10", &["Reboot {HOST.NAME} ({HOST.HOST})?", "limit {$LIMIT}"]),
                ("20", &["ping {HOST.CONN}"]),
                ("99", &["{HOST.NAME}", "plain"]),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["Reboot Web server (web01)?", "limit 90"]);
    // SNMP wins over JMX.
    assert_eq!(out["20"], vec!["ping 10.0.0.20"]);
    assert_eq!(out["99"], vec!["*UNKNOWN*", "plain"]);
}

#[tokio::test]
async fn interface_addresses_are_expanded_once() {
    let (store, resolver) = setup();
    let out = resolver
        .resolve_texts(
            Scenario::HostInterfaceIpDns,
            texts(&[("10", &["{HOST.IP}", "{HOST.DNS}"])]),
        )
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["192.168.1.10", "web01.lan"]);
    assert_eq!(store.call_count("primary_interfaces"), 1);
}

#[tokio::test]
async fn interface_expansion_shares_user_macro_lookups() {
    let (store, resolver) = setup();
    let out = resolver
        .resolve_texts(
            Scenario::ScriptConfirmation,
            texts(&[("10", &["{HOST.IP} {$LIMIT} {$AGENT_IP}"])]),
        )
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["192.168.1.10 90 192.168.1.10"]);
    let ids = host_macro_ids(&store);
    assert_no_repeats(&ids);
    assert_eq!(ids, vec!["10", "1"]);
}

#[tokio::test]
async fn global_macros_are_loaded_once_across_nesting() {
    let (store, resolver) = setup();
    let out = resolver
        .resolve_texts(
            Scenario::ScriptConfirmation,
            texts(&[("30", &["{HOST.IP} {$NOWHERE}"])]),
        )
        .await
        .unwrap();
    assert_eq!(out["30"], vec!["{$NOWHERE_IP} {$NOWHERE}"]);
    assert_eq!(store.call_count("global_macros"), 1);
    assert_no_repeats(&host_macro_ids(&store));
}

#[tokio::test]
async fn port_scenario_leaves_host_macros_verbatim() {
    let (_, resolver) = setup();
    let out = resolver
        .resolve_texts(
            Scenario::HostInterfacePort,
            texts(&[("10", &["{HOST.HOST}:{$LIMIT}"])]),
        )
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["{HOST.HOST}:90"]);
}

#[tokio::test]
async fn screen_url_resolves_host_id() {
    let (_, resolver) = setup();
    let out = resolver
        .resolve_texts(
            Scenario::ScreenElementUrl,
            texts(&[("20", &["/hosts?id={HOST.ID}&n={HOST.HOST}"])]),
        )
        .await
        .unwrap();
    assert_eq!(out["20"], vec!["/hosts?id=20&n=db01"]);
}

#[tokio::test]
async fn nesting_limit_rejects_deep_calls() {
    let (_, resolver) = setup();
    let mut users = UserMacroResolver::new(resolver.store.as_ref(), resolver.config());
    let err = resolver
        .resolve_texts_at(
            Scenario::HostInterfacePort,
            texts(&[("10", &["x"])]),
            resolver.config().max_nesting_depth,
            &mut users,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::NestingTooDeep { .. }));
}

#[tokio::test]
async fn nesting_limit_of_one_skips_interface_expansion() {
    let store = Arc::new(MemoryStore::from_yaml_str(SNAPSHOT).unwrap());
    let config = ResolverConfig {
        max_nesting_depth: 1,
        ..ResolverConfig::default()
    };
    let resolver = MacroResolver::with_store(store, config);
    let out = resolver
        .resolve_texts(Scenario::HostInterfaceIpDns, texts(&[("10", &["{HOST.IP}"])]))
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["{$AGENT_IP}"]);
}

// ── Trigger scenarios ─────────────────────────────────────────

#[tokio::test]
async fn unsuffixed_and_first_ordinal_agree() {
    let (_, resolver) = setup();
    let out = resolver
        .resolve_triggers(
            Scenario::TriggerName,
            trigger("{1}>0 or {2}=0", "{HOST.HOST}|{HOST.HOST1}|{HOST.HOST2}|{HOST.HOST3}"),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(out["500"].description, "web01|web01|db01|*UNKNOWN*");
    assert_eq!(out["500"].expression, "{1}>0 or {2}=0");
}

#[tokio::test]
async fn trigger_name_item_values_and_references() {
    let (_, resolver) = setup();
    let out = resolver
        .resolve_triggers(
            Scenario::TriggerName,
            trigger("{1}>{$LIMIT} or {2}=0", "load {ITEM.VALUE} over $1, db {ITEM.LASTVALUE2} $2 $3"),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(out["500"].description, "load 4.25 over 90, db Down (0) 0 ");
    // The stored expression keeps its user macro.
    assert_eq!(out["500"].expression, "{1}>{$LIMIT} or {2}=0");
}

#[tokio::test]
async fn trigger_interface_expansion_reuses_loaded_hosts() {
    let (store, resolver) = setup();
    let out = resolver
        .resolve_triggers(
            Scenario::TriggerName,
            trigger("{1}>{$LIMIT}", "{HOST.IP} over $1"),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(out["500"].description, "192.168.1.10 over 90");
    assert_no_repeats(&host_macro_ids(&store));
    assert!(store.call_count("global_macros") <= 1);
}

#[tokio::test]
async fn references_only_mode_skips_lookups() {
    let (store, resolver) = setup();
    let out = resolver
        .resolve_triggers(
            Scenario::TriggerName,
            trigger("{1}>5", "{HOST.HOST} above $1"),
            ResolveOptions {
                references_only: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(out["500"].description, "{HOST.HOST} above 5");
    assert_eq!(store.call_count("function_hosts"), 0);
}

#[tokio::test]
async fn event_name_reads_value_at_event_time() {
    let (store, resolver) = setup();
    let mut triggers = trigger("{2}=0", "{ITEM.VALUE} now {ITEM.LASTVALUE}");
    if let Some(t) = triggers.get_mut("500") {
        t.clock = Some(1200);
        t.ns = Some(0);
    }
    let out = resolver
        .resolve_triggers(Scenario::EventName, triggers, ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(out["500"].description, "Up (1) now Down (0)");
    assert_eq!(store.call_count("value_at"), 1);
}

#[tokio::test]
async fn trigger_interface_and_port() {
    let (_, resolver) = setup();
    let mut triggers = trigger("{2}=0", "");
    if let Some(t) = triggers.get_mut("500") {
        t.comments = "{HOST.CONN}:{HOST.PORT} on {HOST.NAME}".into();
    }
    let out = resolver
        .resolve_triggers(Scenario::TriggerDescription, triggers, ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(out["500"].comments, "10.0.0.20:161 on db01");
}

#[tokio::test]
async fn trigger_url_macros() {
    let (_, resolver) = setup();
    let mut triggers = trigger("{1}>0", "");
    if let Some(t) = triggers.get_mut("500") {
        t.url = "/t/{TRIGGER.ID}/h/{HOST.ID}?q={$LIMIT}".into();
    }
    let out = resolver
        .resolve_triggers(Scenario::TriggerUrl, triggers, ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(out["500"].url, "/t/500/h/10?q=90");
}

#[tokio::test]
async fn trigger_url_keeps_deprecated_spellings() {
    let (_, resolver) = setup();
    let mut triggers = trigger("{1}>0", "");
    if let Some(t) = triggers.get_mut("500") {
        t.url = "/h/{HOSTNAME}/{IPADDRESS}/{HOST.HOST}".into();
    }
    let out = resolver
        .resolve_triggers(Scenario::TriggerUrl, triggers, ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(out["500"].url, "/h/{HOSTNAME}/{IPADDRESS}/web01");
}

#[tokio::test]
async fn expression_user_macros() {
    let (_, resolver) = setup();
    let out = resolver
        .resolve_triggers(
            Scenario::TriggerExpressionUser,
            trigger("{1}>{$LIMIT} and {1}<{$UNDEFINED}", ""),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(out["500"].expression, "{1}>90 and {1}<{$UNDEFINED}");
}

// ── Graph names ───────────────────────────────────────────────

#[tokio::test]
async fn graph_functional_macros() {
    let (_, resolver) = setup();
    let mut graphs = IndexMap::new();
    graphs.insert(
        "g1".to_string(),
        GraphRecord {
            name: "cpu {{HOST.HOST}:cpu.load.last()} max {{HOST.HOST}:cpu.load.max(5m)} \
                   min {web01:cpu.load.min()} x {{HOST.HOST2}:cpu.load.last()}"
                .into(),
            items: vec![GraphItem {
                host_id: "10".into(),
                host: "web01".into(),
            }],
        },
    );
    let out = resolver.resolve_graph_names(graphs).await;
    assert_eq!(out["g1"].name, "cpu 4.25 max 4.25 min *UNKNOWN* x *UNKNOWN*");
}

#[tokio::test]
async fn graph_hides_items_the_caller_cannot_see() {
    let (_, resolver) = setup();
    let mut graphs = IndexMap::new();
    graphs.insert(
        "g2".to_string(),
        GraphRecord {
            name: "{{HOST.HOST}:secret.load.last()} vs {{HOST.HOST}:cpu.load.last()}".into(),
            items: vec![GraphItem {
                host_id: "10".into(),
                host: "web01".into(),
            }],
        },
    );
    let out = resolver.resolve_graph_names(graphs).await;
    assert_eq!(out["g2"].name, "*UNKNOWN* vs 4.25");
}

// ── Item scenarios ────────────────────────────────────────────

#[tokio::test]
async fn item_key_resolves_params_only() {
    let (store, resolver) = setup();
    let mut items = IndexMap::new();
    items.insert(
        "a".to_string(),
        item("100", "10", "", "net.tcp.service[http,{HOST.IP},{$LIMIT}]"),
    );
    items.insert("b".to_string(), item("300", "20", "", r#"jmx["{HOST.CONN}",{HOST.HOST}]"#));
    items.insert("c".to_string(), item("100", "10", "", "{HOST.HOST}"));
    items.insert("d".to_string(), item("404", "10", "", "k[{HOST.NAME},{$PAIR}]"));

    let out = resolver.resolve_items(Scenario::ItemKey, items).await.unwrap();
    assert_eq!(out["a"].key, "net.tcp.service[http,192.168.1.10,90]");
    // The item's own JMX interface wins over the host's SNMP one.
    assert_eq!(out["b"].key, r#"jmx["10.0.0.21",db01]"#);
    assert_eq!(out["c"].key, "{HOST.HOST}");
    assert_eq!(out["d"].key, r#"k[*UNKNOWN*,"a,b"]"#);
    assert_eq!(store.call_count("item_hosts"), 1);
    assert_eq!(store.call_count("host_interfaces"), 1);
    assert_no_repeats(&host_macro_ids(&store));
}

#[tokio::test]
async fn item_name_references_follow_the_expanded_key() {
    let (_, resolver) = setup();
    let mut items = IndexMap::new();
    items.insert(
        "a".to_string(),
        item(
            "100",
            "10",
            "Check $1 at $2 ($3), limit {$LIMIT}",
            "net.tcp.service[http,{$AGENT_IP}]",
        ),
    );
    let mut given = item("100", "10", "Free on $1", "vfs.fs.size[{$FS},free]");
    given.key_expanded = Some("vfs.fs.size[/data,free]".into());
    items.insert("b".to_string(), given);

    let out = resolver
        .resolve_named("itemName", MacroInputs::Items(items), ResolveOptions::default())
        .await
        .unwrap();
    let MacroInputs::Items(out) = out else {
        panic!("expected items");
    };
    assert_eq!(out["a"].name, "Check http at 192.168.1.10 (), limit 90");
    assert_eq!(out["a"].key, "net.tcp.service[http,{$AGENT_IP}]");
    assert_eq!(out["b"].name, "Free on /data");
}

#[tokio::test]
async fn function_parameters_expand_user_macros() {
    let (store, resolver) = setup();
    let record = |host: &str, parameter: &str| FunctionRecord {
        host_id: host.into(),
        function: "last".into(),
        parameter: parameter.into(),
    };
    let mut functions = IndexMap::new();
    functions.insert("f1".to_string(), record("10", "#3,{$LIMIT}"));
    functions.insert("f2".to_string(), record("20", r#""{$LIMIT}",5m"#));
    functions.insert("f3".to_string(), record("10", "{$PAIR}"));
    functions.insert("f4".to_string(), record("10", "#1"));

    let out = resolver.resolve_function_parameters(functions).await;
    assert_eq!(out["f1"].parameter, "#3,90");
    assert_eq!(out["f2"].parameter, r#""{$LIMIT}",5m"#);
    assert_eq!(out["f3"].parameter, r#""a,b""#);
    assert_eq!(out["f4"].parameter, "#1");
    assert_no_repeats(&host_macro_ids(&store));
}

// ── Fail-open collaborators ───────────────────────────────────

struct FailingStore;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("connection refused".into()))
}

#[async_trait::async_trait]
impl ConfigStore for FailingStore {
    async fn hosts_by_ids(&self, _: &[HostId]) -> Result<Vec<HostRecord>, StoreError> {
        down()
    }
    async fn primary_interfaces(
        &self,
        _: &[HostId],
        _: &[InterfaceType],
    ) -> Result<Vec<InterfaceRecord>, StoreError> {
        down()
    }
    async fn function_hosts(&self, _: &[FunctionId]) -> Result<Vec<FunctionHost>, StoreError> {
        down()
    }
    async fn function_interfaces(
        &self,
        _: &[FunctionId],
    ) -> Result<Vec<FunctionInterface>, StoreError> {
        down()
    }
    async fn function_items(&self, _: &[FunctionId]) -> Result<Vec<FunctionItem>, StoreError> {
        down()
    }
    async fn trigger_host_ids(
        &self,
        _: &[TriggerId],
    ) -> Result<HashMap<TriggerId, Vec<HostId>>, StoreError> {
        down()
    }
    async fn host_macros(&self, _: &[HostId]) -> Result<HashMap<HostId, HostMacroSet>, StoreError> {
        down()
    }
    async fn global_macros(&self) -> Result<Vec<MacroDefinition>, StoreError> {
        down()
    }
    async fn items_by_host_keys(&self, _: &[HostKey]) -> Result<Vec<ItemMeta>, StoreError> {
        down()
    }
    async fn item_hosts(&self, _: &[confmacro_core::ItemId]) -> Result<Vec<ItemHost>, StoreError> {
        down()
    }
    async fn host_interfaces(&self, _: &[HostId]) -> Result<Vec<InterfaceRecord>, StoreError> {
        down()
    }
}

/// Splits `name[a,b]` on commas; enough for unquoted test keys.
impl KeyParams for FailingStore {
    fn item_key_params(&self, key: &str) -> Option<Vec<String>> {
        let inner = key.split_once('[')?.1.strip_suffix(']')?;
        Some(inner.split(',').map(str::to_string).collect())
    }

    fn rewrite_item_key(&self, key: &str, rewrite: &dyn Fn(&str) -> String) -> String {
        let Some((name, inner)) = key
            .split_once('[')
            .and_then(|(name, rest)| Some((name, rest.strip_suffix(']')?)))
        else {
            return key.to_string();
        };
        let params: Vec<String> = inner.split(',').map(rewrite).collect();
        format!("{name}[{}]", params.join(","))
    }

    fn function_params(&self, parameter: &str) -> Option<Vec<String>> {
        Some(parameter.split(',').map(str::to_string).collect())
    }

    fn rewrite_function_params(&self, parameter: &str, rewrite: &dyn Fn(&str) -> String) -> String {
        parameter.split(',').map(rewrite).collect::<Vec<_>>().join(",")
    }
}

#[async_trait::async_trait]
impl HistoryStore for FailingStore {
    async fn last_values(
        &self,
        _: &[confmacro_core::ItemId],
    ) -> Result<HashMap<confmacro_core::ItemId, ItemSample>, StoreError> {
        down()
    }
    async fn value_at(&self, _: &ItemMeta, _: i64, _: i64) -> Result<Option<ItemSample>, StoreError> {
        down()
    }
    async fn aggregate(
        &self,
        _: &ItemMeta,
        _: AggregateFunction,
        _: i64,
    ) -> Result<Option<String>, StoreError> {
        down()
    }
}

#[tokio::test]
async fn store_failures_resolve_to_markers() {
    let resolver = MacroResolver::with_store(Arc::new(FailingStore), ResolverConfig::default());
    let out = resolver
        .resolve_texts(
            Scenario::ScriptConfirmation,
            texts(&[("10", &["{HOST.NAME} {HOST.IP} {$A}"])]),
        )
        .await
        .unwrap();
    assert_eq!(out["10"], vec!["*UNKNOWN* *UNKNOWN* {$A}"]);

    let out = resolver
        .resolve_triggers(
            Scenario::TriggerName,
            trigger("{1}>3", "{ITEM.VALUE} $1"),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(out["500"].description, "*UNKNOWN* 3");

    let mut items = IndexMap::new();
    items.insert("a".to_string(), item("100", "10", "", "k[{HOST.HOST},{$A}]"));
    let out = resolver.resolve_items(Scenario::ItemKey, items).await.unwrap();
    assert_eq!(out["a"].key, "k[*UNKNOWN*,{$A}]");
}
