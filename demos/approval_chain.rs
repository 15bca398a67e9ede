//! Basic Signoff approval chain example.
//!
//! This example demonstrates:
//! - Defining task types and registering them for rehydration
//! - Starting a flow and suspending on the first unmet task
//! - Approving tasks one by one as their approvers sign off
//! - Leaf-to-root execution once all approvals are in
//! - Checking flow reports and observing flow events
//!
//! Run with: `cargo run --example approval_chain`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use signoff::{
    Engine, FlowEvent, MemoryRecordStore, Outcome, Result, Task, TaskRegistry,
};

/// The root task: the purchase itself, gated on manager and finance.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PurchaseRequest {
    item: String,
    amount: u32,
}

#[async_trait]
impl Task for PurchaseRequest {
    fn kind(&self) -> &str {
        "purchase"
    }

    fn tag(&self) -> String {
        format!("purchase:{}", self.item)
    }

    fn params(&self) -> serde_json::Value {
        json!({ "item": self.item, "amount": self.amount })
    }

    fn dependencies(&self) -> Vec<Box<dyn Task>> {
        vec![
            Box::new(ManagerApproval {
                item: self.item.clone(),
            }),
            Box::new(FinanceApproval {
                item: self.item.clone(),
                amount: self.amount,
            }),
        ]
    }

    async fn run(&self) -> std::result::Result<(), signoff::BoxError> {
        println!("  💳 Placing order for '{}' (${})", self.item, self.amount);
        Ok(())
    }

    async fn on_delayed(&self, awaiting: &dyn Task) {
        println!("  ✉️  Notifying approver of '{}'", awaiting.tag());
    }
}

/// The requester's manager signs off first.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManagerApproval {
    item: String,
}

#[async_trait]
impl Task for ManagerApproval {
    fn kind(&self) -> &str {
        "manager-approval"
    }

    fn tag(&self) -> String {
        format!("manager:{}", self.item)
    }

    fn params(&self) -> serde_json::Value {
        json!({ "item": self.item })
    }

    async fn run(&self) -> std::result::Result<(), signoff::BoxError> {
        println!("  📝 Filing manager sign-off for '{}'", self.item);
        Ok(())
    }

    async fn on_approved(&self) {
        println!("  👍 Manager approved '{}'", self.item);
    }
}

/// Finance signs off too, but only after the budget line is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FinanceApproval {
    item: String,
    amount: u32,
}

#[async_trait]
impl Task for FinanceApproval {
    fn kind(&self) -> &str {
        "finance-approval"
    }

    fn tag(&self) -> String {
        format!("finance:{}", self.item)
    }

    fn params(&self) -> serde_json::Value {
        json!({ "item": self.item, "amount": self.amount })
    }

    fn dependencies(&self) -> Vec<Box<dyn Task>> {
        vec![Box::new(BudgetCheck {
            amount: self.amount,
        })]
    }

    async fn run(&self) -> std::result::Result<(), signoff::BoxError> {
        println!("  📒 Booking ${} against the budget", self.amount);
        Ok(())
    }
}

/// Confirms the amount fits the remaining budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BudgetCheck {
    amount: u32,
}

#[async_trait]
impl Task for BudgetCheck {
    fn kind(&self) -> &str {
        "budget-check"
    }

    fn tag(&self) -> String {
        format!("budget:{}", self.amount)
    }

    fn params(&self) -> serde_json::Value {
        json!({ "amount": self.amount })
    }

    async fn run(&self) -> std::result::Result<(), signoff::BoxError> {
        println!("  🧮 Reserving ${} in the ledger", self.amount);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("╔═══════════════════════════════════════════╗");
    println!("║  Signoff Approval Chain Example           ║");
    println!("╚═══════════════════════════════════════════╝\n");

    // Register every task type so persisted flows can be rehydrated
    println!("📋 Registering task types...");
    let mut registry = TaskRegistry::new();
    registry.register_type::<PurchaseRequest>("purchase");
    registry.register_type::<ManagerApproval>("manager-approval");
    registry.register_type::<FinanceApproval>("finance-approval");
    registry.register_type::<BudgetCheck>("budget-check");
    println!("   Kinds: {:?}\n", registry.kinds());

    let mut engine = Engine::new(registry, MemoryRecordStore::new());

    // Subscribe to events (in background)
    let mut event_receiver = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_receiver.recv().await {
            match event {
                FlowEvent::TaskDiscovered { tag, .. } => {
                    println!("   [Event] Task '{}' discovered", tag);
                }
                FlowEvent::TaskApproved { tag, .. } => {
                    println!("   [Event] Task '{}' approved", tag);
                }
                FlowEvent::TaskExecuted { tag, .. } => {
                    println!("   [Event] Task '{}' executed", tag);
                }
                FlowEvent::FlowExecuted { flow_id } => {
                    println!("   [Event] Flow '{}' executed", flow_id);
                }
                _ => {}
            }
        }
    });

    // Create the flow: a laptop purchase needing three sign-offs
    let mut flow = engine
        .new_flow(
            "purchase",
            "laptop for alice",
            json!({ "item": "laptop", "amount": 1800 }),
        )
        .await?;
    println!("🧾 Created flow '{}' ({})\n", flow.annotation, flow.id);

    // Start the flow; it suspends on the first task awaiting approval
    println!("▶️  Starting flow");
    println!("─────────────────────────────────────────");
    let mut outcome = engine.start(&mut flow).await?;

    // Approve whatever the engine surfaces until nothing is unmet
    while let Outcome::AwaitingApproval(task) = outcome {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        println!("\n📊 Flow report:");
        println!("─────────────────────────────────────────");
        println!("{}", engine.report(&flow).await?);

        println!("👤 Approver signs off on '{}'", task.tag());
        println!("─────────────────────────────────────────");
        outcome = engine.approve(&mut flow, task.as_ref()).await?;
    }

    // Give events time to print
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    println!("\n📊 Final report:");
    println!("─────────────────────────────────────────");
    println!("{}", engine.report(&flow).await?);

    if outcome.is_executed() {
        println!("🎉 Success! Purchase approved and executed!\n");
    }

    Ok(())
}
