//! CQL dataset loading against the in-memory cluster

use cassandra_unit::driver::memory::Operation;
use cassandra_unit::loader::{CqlDataLoader, DEFAULT_KEYSPACE};
use cassandra_unit::{
    load, ClasspathResources, ClusterDescriptor, CqlDataSet, DataSetType, DriverError, Error,
    LoadRequest, MemoryCluster,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn resources() -> ClasspathResources {
    ClasspathResources::new([concat!(env!("CARGO_MANIFEST_DIR"), "/tests/resources")])
}

fn request(locations: &[&str]) -> LoadRequest {
    let cluster = ClusterDescriptor::new("Test Cluster", "127.0.0.1", 9142).unwrap();
    LoadRequest::new(cluster, DataSetType::Cql, locations.iter().copied()).with_keyspace("mykeyspace")
}

fn count(journal: &[Operation], wanted: impl Fn(&Operation) -> bool) -> usize {
    journal.iter().filter(|op| wanted(op)).count()
}

#[tokio::test]
async fn test_simple_dataset() {
    let server = MemoryCluster::new();
    load(&server, &resources(), &request(&["cql/simple.cql"])).await.unwrap();

    assert_eq!(server.table_names("mykeyspace"), vec!["mytable"]);
    let rows = server.table_rows("mykeyspace", "mytable");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "myKey01");
    assert_eq!(rows[0]["value"], "myValue01");
    assert_eq!(rows[1]["value"], "myValue02");

    let keyspace = server.describe_keyspace("mykeyspace").unwrap();
    assert_eq!(keyspace.replication_factor, 1);
}

#[tokio::test]
async fn test_default_keyspace() {
    let server = MemoryCluster::new();
    let cluster = ClusterDescriptor::new("Test Cluster", "127.0.0.1", 9142).unwrap();
    let request = LoadRequest::new(cluster, DataSetType::Cql, ["cql/simple.cql"]);
    load(&server, &resources(), &request).await.unwrap();

    assert_eq!(server.user_keyspaces(), vec![DEFAULT_KEYSPACE]);
    assert_eq!(server.table_rows(DEFAULT_KEYSPACE, "mytable").len(), 2);
}

#[tokio::test]
async fn test_only_first_file_recreates_the_keyspace() {
    let server = MemoryCluster::new();
    load(&server, &resources(), &request(&["cql/simple.cql", "cql/second.cql"]))
        .await
        .unwrap();

    let journal = server.journal();
    assert_eq!(count(&journal, |op| matches!(op, Operation::DropKeyspace(_))), 1);
    assert_eq!(count(&journal, |op| matches!(op, Operation::CreateKeyspace(_))), 1);
    assert_eq!(
        count(&journal, |op| matches!(op, Operation::Use(ks) if ks == "mykeyspace")),
        2
    );
    assert_eq!(server.connection_count(), 1);

    assert_eq!(server.table_names("mykeyspace"), vec!["mytable", "othertable"]);
    let others = server.table_rows("mykeyspace", "othertable");
    assert_eq!(others.len(), 2);
    assert_eq!(others[0]["note"], "one; two");
}

#[tokio::test]
async fn test_each_call_starts_from_a_fresh_keyspace() {
    let server = MemoryCluster::new();
    let request = request(&["cql/simple.cql"]);
    load(&server, &resources(), &request).await.unwrap();
    load(&server, &resources(), &request).await.unwrap();
    assert_eq!(server.table_rows("mykeyspace", "mytable").len(), 2);
}

#[tokio::test]
async fn test_driver_error_stops_the_load() {
    let server = MemoryCluster::new();
    let result = load(&server, &resources(), &request(&["cql/broken.cql"])).await;

    match result {
        Err(Error::Load(DriverError::InvalidRequest(message))) => {
            assert!(message.contains("no viable alternative"), "{}", message)
        }
        other => panic!("expected an invalid request, got {:?}", other),
    }
    // applied statements stay, later ones never run
    assert_eq!(server.table_names("mykeyspace"), vec!["brokentable"]);
    assert!(server.table_rows("mykeyspace", "brokentable").is_empty());
}

#[tokio::test]
async fn test_earlier_files_are_not_rolled_back() {
    let server = MemoryCluster::new();
    let result = load(&server, &resources(), &request(&["cql/simple.cql", "cql/broken.cql"])).await;

    assert!(matches!(result, Err(Error::Load(_))));
    assert_eq!(server.table_rows("mykeyspace", "mytable").len(), 2);
}

#[tokio::test]
async fn test_missing_file_is_reported_before_connecting() {
    let server = MemoryCluster::new();
    let result = load(&server, &resources(), &request(&["cql/simple.cql", "cql/missing.cql"])).await;

    assert!(matches!(result, Err(Error::ResourceNotFound(_))));
    assert_eq!(server.connection_count(), 0);
    assert!(server.user_keyspaces().is_empty());
}

#[tokio::test]
async fn test_empty_keyspace_is_a_configuration_error() {
    let server = MemoryCluster::new();
    let request = request(&["cql/simple.cql"]).with_keyspace("");
    let result = load(&server, &resources(), &request).await;
    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn test_data_loader_on_a_session() {
    let server = MemoryCluster::new();
    let loader = CqlDataLoader::new(server.session());
    let data_set = CqlDataSet::from_script(
        "CREATE TABLE users (id int PRIMARY KEY, name text);\n\
         INSERT INTO users (id, name) VALUES (1, 'ann');",
    )
    .in_keyspace("direct", true);

    loader.load(&data_set).await.unwrap();
    assert_eq!(loader.session().current_keyspace().as_deref(), Some("direct"));
    assert_eq!(server.table_rows("direct", "users")[0]["name"], "ann");
}

#[tokio::test]
async fn test_data_loader_without_keyspace_runs_statements_as_is() {
    let server = MemoryCluster::new();
    let loader = CqlDataLoader::new(server.session());
    let data_set = CqlDataSet::from_script(
        "CREATE KEYSPACE plain WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 2};\n\
         CREATE TABLE plain.t (id int PRIMARY KEY);",
    );

    loader.load(&data_set).await.unwrap();
    assert_eq!(server.describe_keyspace("plain").unwrap().replication_factor, 2);
    assert_eq!(server.table_names("plain"), vec!["t"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_recreate_happens_once_per_call(files in 1usize..6) {
        let dir = TempDir::new().unwrap();
        let locations: Vec<String> = (0..files)
            .map(|i| {
                let name = format!("file{}.cql", i);
                std::fs::write(
                    dir.path().join(&name),
                    format!("CREATE TABLE t{i} (id int PRIMARY KEY);\nINSERT INTO t{i} (id) VALUES ({i});", i = i),
                )
                .unwrap();
                name
            })
            .collect();

        let server = MemoryCluster::new();
        let resources = ClasspathResources::new([dir.path()]);
        let cluster = ClusterDescriptor::new("Test Cluster", "127.0.0.1", 9142).unwrap();
        let request = LoadRequest::new(cluster, DataSetType::Cql, locations).with_keyspace("prop");

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(load(&server, &resources, &request)).unwrap();

        let journal = server.journal();
        prop_assert_eq!(count(&journal, |op| matches!(op, Operation::DropKeyspace(_))), 1);
        prop_assert_eq!(count(&journal, |op| matches!(op, Operation::CreateKeyspace(_))), 1);
        prop_assert_eq!(count(&journal, |op| matches!(op, Operation::Use(_))), files);
        prop_assert_eq!(server.table_names("prop").len(), files);
    }
}
