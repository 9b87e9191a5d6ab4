use super::*;

const SNAPSHOT: &str = r#"
now: 1000
hosts:
  - id: "10"
    host: web01
    name: Web 01
    templates: ["1"]
  - id: "1"
    host: Template OS
value_maps:
  - id: 3
    mappings: { "1": Up }
interfaces:
  - { host_id: "10", type: agent, ip: 10.0.0.1, dns: web01.local, port: "10050" }
  - { host_id: "10", type: snmp, ip: 10.0.0.2, port: "161" }
  - { host_id: "10", interface_id: "9", type: agent, ip: 10.0.0.9, main: false }
items:
  - { id: "100", host_id: "10", key: cpu.load, value_type: float }
  - { id: "101", host_id: "10", key: net.up, value_type: uint64, valuemap_id: 3, interface_id: "9" }
  - { id: "102", host_id: "10", key: secret.key, value_type: float, web_visible: false }
triggers:
  - id: "500"
    functions:
      - { id: "7", item_id: "100" }
      - { id: "8", item_id: "101" }
history:
  - { item_id: "100", clock: 900, value: "1" }
  - { item_id: "100", clock: 950, value: "3" }
  - { item_id: "100", clock: 990, value: "2" }
  - { item_id: "100", clock: 100, value: "50" }
"#;

fn store() -> MemoryStore {
    MemoryStore::from_yaml_str(SNAPSHOT).unwrap()
}

#[tokio::test]
async fn hosts_default_visible_name() {
    let s = store();
    let hosts = s.hosts_by_ids(&["1".into(), "10".into(), "99".into()]).await.unwrap();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].name, "Template OS");
    assert_eq!(hosts[1].name, "Web 01");
}

#[tokio::test]
async fn primary_interfaces_filter_type_and_main() {
    let s = store();
    let rows = s
        .primary_interfaces(&["10".into()], &[InterfaceType::Agent])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ip, "10.0.0.1");
}

#[tokio::test]
async fn function_lookups_join_items_and_hosts() {
    let s = store();
    let hosts = s.function_hosts(&["7".into(), "404".into()]).await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].trigger_id, "500");
    assert_eq!(hosts[0].host, "web01");

    let items = s.function_items(&["8".into()]).await.unwrap();
    assert_eq!(items[0].item.key, "net.up");
    assert!(items[0].item.value_map.is_some());

    let ifaces = s.function_interfaces(&["7".into()]).await.unwrap();
    assert_eq!(ifaces.len(), 2);
}

#[tokio::test]
async fn item_hosts_carry_the_polling_interface() {
    let s = store();
    let rows = s.item_hosts(&["100".into(), "101".into(), "404".into()]).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].host, "web01");
    assert_eq!(rows[0].interface_id, "");
    assert_eq!(rows[1].interface_id, "9");

    let ifaces = s.host_interfaces(&["10".into()]).await.unwrap();
    assert_eq!(ifaces.len(), 3);
    assert!(ifaces.iter().any(|i| !i.main));
}

#[test]
fn key_params_delegate_to_the_key_grammar() {
    let s = store();
    assert_eq!(
        s.item_key_params("vfs.fs.size[/,free]"),
        Some(vec!["/".to_string(), "free".to_string()])
    );
    assert_eq!(s.rewrite_item_key("k[a]", &|p: &str| format!("{p} b")), "k[a b]");
}

#[tokio::test]
async fn hidden_items_are_not_returned_by_host_key() {
    let s = store();
    let items = s
        .items_by_host_keys(&[
            HostKey::new("web01", "cpu.load"),
            HostKey::new("web01", "secret.key"),
        ])
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_id, "100");
}

#[tokio::test]
async fn history_last_and_value_at() {
    let s = store();
    let last = s.last_values(&["100".into(), "101".into()]).await.unwrap();
    assert_eq!(last["100"].value, "2");
    assert!(!last.contains_key("101"));

    let items = s.function_items(&["7".into()]).await.unwrap();
    let meta = &items[0].item;
    let at = s.value_at(meta, 960, 0).await.unwrap().unwrap();
    assert_eq!(at.value, "3");
    assert!(s.value_at(meta, 50, 0).await.unwrap().is_none());
}

#[tokio::test]
async fn aggregates_use_window_anchored_at_now() {
    let s = store();
    let items = s.function_items(&["7".into()]).await.unwrap();
    let meta = &items[0].item;
    let max = s.aggregate(meta, AggregateFunction::Max, 300).await.unwrap();
    assert_eq!(max.as_deref(), Some("3"));
    let avg = s.aggregate(meta, AggregateFunction::Avg, 300).await.unwrap();
    assert_eq!(avg.as_deref(), Some("2"));
    let min = s.aggregate(meta, AggregateFunction::Min, 60).await.unwrap();
    assert_eq!(min.as_deref(), Some("2"));
    assert!(s.aggregate(meta, AggregateFunction::Min, 5).await.unwrap().is_none());
}

#[tokio::test]
async fn calls_are_recorded() {
    let s = store();
    s.host_macros(&["10".into()]).await.unwrap();
    s.global_macros().await.unwrap();
    assert_eq!(s.call_count("host_macros"), 1);
    assert_eq!(
        s.calls()[0],
        StoreCall {
            method: "host_macros",
            ids: vec!["10".into()]
        }
    );
    s.clear_calls();
    assert!(s.calls().is_empty());
}

#[test]
fn snapshot_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.yaml");
    std::fs::write(&path, SNAPSHOT).unwrap();
    let s = MemoryStore::from_path(&path).unwrap();
    assert_eq!(s.snapshot().hosts.len(), 2);
}

#[test]
fn malformed_snapshot_is_a_snapshot_error() {
    let err = MemoryStore::from_yaml_str("hosts: [").err().unwrap();
    assert!(matches!(err, StoreError::Snapshot(_)));
}
