//! Mount a counter into the in-memory DOM, click it a few times at
//! different priorities and log every committed batch.
//!
//! Run with `RUST_LOG=info cargo run -p dom --example counter`.

use anyhow::{Result, anyhow};
use dom::DOM;
use log::info;
use reconciler::{Component, Engine, EngineConfig, SetState, host};
use scheduler::PriorityLevel;
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> Result<()> {
    env_logger::init();

    let clicks: Rc<RefCell<Option<SetState<u32>>>> = Rc::default();
    let slot = Rc::clone(&clicks);
    let counter = Component::new("Counter", move |scope, _props| {
        let (count, set) = scope.use_state(|| 0u32)?;
        *slot.borrow_mut() = Some(set);
        let label = scope.use_state(|| String::from("clicks"))?.0;
        scope.use_effect(None, {
            let count = *count;
            move || {
                info!("effect: count is now {count}");
                None
            }
        })?;
        let items = (0..*count).map(|index| host("li").key(u64::from(index)).child(index.to_string()).build());
        Ok(host("section")
            .children([
                host("h1").child(format!("{count} {label}")).build(),
                host("ul").children(items).build(),
            ])
            .build())
    });

    let mut engine = Engine::new(DOM::new(), EngineConfig::from_env());
    let container = engine.host_mut().create_container("main")?;
    let root = engine.mount(container);
    engine.render(root, counter.element().build())?;
    engine.run_until_idle()?;

    let set = clicks
        .borrow()
        .clone()
        .ok_or_else(|| anyhow!("the counter never rendered"))?;
    set.update(|count| count + 1);
    engine.run_with_priority(PriorityLevel::Normal, |_| set.update(|count| count + 1));
    engine.run_with_priority(PriorityLevel::Low, |_| set.update(|count| count + 1));
    engine.run_until_idle()?;

    for (index, batch) in engine.host_mut().take_batches().iter().enumerate() {
        info!("batch {index}: {}", serde_json::to_string(batch)?);
    }
    info!("{:?}", engine.host());
    if let Some(stats) = engine.last_commit() {
        info!("{} commits, last at lane {}", engine.commit_count(), stats.lane);
    }
    Ok(())
}
