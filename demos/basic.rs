//! Basic example of using the sharded store.

use ringkv::{LookupPolicy, NodeInfo, Record, RingConfig, ShardedStore, StorageNode};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("ringkv=debug,info")
        .init();

    let config = RingConfig::new()
        .with_lookup_policy(LookupPolicy::Lenient)
        .with_node_timeout(Duration::from_millis(250));
    let store = ShardedStore::new(config)?;

    println!("--- Joining nodes ---");
    for (name, host) in [("alpha", "host1"), ("beta", "host2")] {
        let node = Arc::new(StorageNode::new(NodeInfo::new(name, host).with_port(9000)));
        let slot = store.add_node(node).await?;
        println!("{name}@{host} placed at slot {slot}");
    }

    println!("\n--- Keyed operations ---");
    store
        .set("test1", Record::new().with("prop1", "yoyo").with("prop2", "singh"))
        .await?;
    store
        .set("test3", Record::new().with("reverse", "lookup").with("prop2", "jobs"))
        .await?;

    println!("test1 is owned by {}", store.owner_of("test1").await?);
    println!("get(test1) = {:?}", store.get("test1").await?);

    let found = store.reverse_lookup("lookup", "reverse").await?;
    println!("reverse_lookup(lookup, reverse) = {:?}", found.keys);

    println!("\n--- Rebalancing ---");
    for i in 0..1000 {
        store
            .set(&format!("key-{i}"), Record::new().with("bucket", i % 10))
            .await?;
    }
    let node = Arc::new(StorageNode::new(NodeInfo::new("gamma", "host3")));
    store.add_node(node.clone()).await?;
    println!("host3 took over {} records", node.len());

    store.rm_node("host1").await?;
    for (slot, info) in store.members().await {
        println!("  {slot:>5}  {info}");
    }

    println!("\ndel(test1) = {}", store.delete("test1").await?);
    println!("get(test1) = {:?}", store.get("test1").await?);

    // Show metrics
    let metrics = store.metrics();
    println!("\nStore metrics:");
    println!("  Sets: {}", metrics.sets);
    println!("  Hit rate: {:.2}", metrics.hit_rate());
    println!("  Migrations: {}", metrics.migrations_completed);
    println!("  Keys migrated: {}", metrics.keys_migrated);

    Ok(())
}
