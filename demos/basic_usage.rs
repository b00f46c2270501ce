//! Basic pool and arena usage example

use vmpool::{ElementId, GenerationalPool, PoolConfig, VirtualArena};

#[derive(Debug, Clone, Copy, zerocopy::FromZeroes)]
struct Entity {
    hp: i32,
    pos: [f32; 2],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("GenerationalPool Basic Usage Example");
    println!("====================================");

    let config: PoolConfig = serde_json::from_str(r#"{ "reserved_count": 4096, "grow_count": 64 }"#)?;
    let mut pool: GenerationalPool<Entity> = GenerationalPool::with_config(&config)?;

    let ids: Vec<ElementId> = (0..5)
        .map(|i| pool.insert(Entity { hp: 100, pos: [i as f32, 0.0] }))
        .collect::<Result<_, _>>()?;

    pool[ids[2]].hp -= 150;
    println!("Entity {:?} took a hit: hp = {}", ids[2], pool[ids[2]].hp);

    // Dead entities go back to the pool; their handles stop working
    let dead: Vec<ElementId> = pool.iter().filter(|(_, e)| e.hp <= 0).map(|(id, _)| id).collect();
    for id in &dead {
        pool.deallocate(*id)?;
        println!("Freed {id:?}: still valid? {}", pool.is_valid(*id));
    }

    let spawned = pool.insert(Entity { hp: 50, pos: [9.0, 9.0] })?;
    println!("Spawned {spawned:?} in the recycled slot {}", spawned.slot());
    if let Err(err) = pool.get(dead[0]) {
        println!("Old handle rejected: {err}");
    }

    println!("\nLive entities in allocation order:");
    for (id, e) in &pool {
        println!("  {id:?}: hp {:>4} at {:?}", e.hp, e.pos);
    }
    println!("Stats: {}", serde_json::to_string(&pool.stats())?);

    println!("\nVirtualArena:");
    let mut arena = VirtualArena::new(16 << 20, 64 << 10)?;
    let greeting = arena.alloc_str("hello from the arena")?;
    let squares = arena.alloc_slice_copy(&[1u32, 4, 9, 16])?;
    println!("  {greeting}, {squares:?}");
    println!("  used {} of {} bytes", arena.used(), arena.capacity());
    arena.reset()?;
    println!("  after reset: used {}", arena.used());

    Ok(())
}
