//! End-to-end FSP demo.
//!
//! Starts two flow services on an in-process hub: a pre-transaction
//! service that hands the request to a simulated customer screen, and a
//! post-transaction service that processes in the background. A coordinator
//! then drives a payment request through both stages.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fsp_client::FlowClient;
use fsp_registry::{FlowServiceInfo, ServiceRegistry};
use fsp_service::{
    ActivityHandle, ActivityLauncher, ActivityOutcome, ConnectionId, FlowService,
    FlowServiceHandler, LifecycleEvent, ServiceConfig, ServiceContext, ServiceError,
};
use fsp_transport::{EndpointAddress, TransportHub};
use fsp_types::{FlowStage, InternalData};

/// POS flow demo CLI
#[derive(Parser)]
#[command(name = "pos-flow-demo")]
#[command(about = "Drive a payment request through FSP flow services", long_about = None)]
#[command(version)]
struct Cli {
    /// Amount in minor currency units
    #[arg(long, env = "FSP_DEMO_AMOUNT", default_value_t = 1000)]
    amount: u64,

    /// Currency code
    #[arg(long, env = "FSP_DEMO_CURRENCY", default_value = "EUR")]
    currency: String,

    /// Log level
    #[arg(long, env = "FSP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Pre-transaction service: hands the request to a simulated customer
/// screen that applies a loyalty discount.
struct LoyaltyDiscount;

#[async_trait]
impl FlowServiceHandler for LoyaltyDiscount {
    async fn process_request(
        &self,
        ctx: ServiceContext,
        request: String,
        sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        info!(
            stage = ?ctx.flow_stage(),
            sender = sender.as_ref().map(|s| s.sender_id()).unwrap_or("unknown"),
            "loyalty service processing"
        );
        ctx.launch_activity(request).await
    }

    async fn on_activity_lifecycle_event(&self, event: LifecycleEvent) {
        info!(?event, "customer screen lifecycle");
    }
}

/// Simulates the customer-facing discount screen.
struct CustomerScreen;

#[async_trait]
impl ActivityLauncher for CustomerScreen {
    async fn launch(
        &self,
        connection_id: ConnectionId,
        request: String,
    ) -> Result<ActivityHandle, ServiceError> {
        let (handle, mut controller) = ActivityHandle::channel();
        tokio::spawn(async move {
            controller.send_lifecycle_event(LifecycleEvent::Started).await;
            info!(%connection_id, "customer screen shown");

            // The screen takes 200ms; a force-finish during that window
            // dismisses it with no response.
            let wait = tokio::time::timeout(
                Duration::from_millis(200),
                controller.finish_requested(),
            )
            .await;
            match wait {
                Ok(()) => {
                    warn!(%connection_id, "customer screen force finished");
                    controller.complete(ActivityOutcome::NoResponse);
                }
                Err(_elapsed) => {
                    let outcome = match apply_discount(&request) {
                        Ok(discounted) => ActivityOutcome::Response(discounted),
                        Err(err) => ActivityOutcome::Failed {
                            code: "DISCOUNT_FAILED".to_string(),
                            message: err.to_string(),
                        },
                    };
                    controller.send_lifecycle_event(LifecycleEvent::Stopped).await;
                    controller.complete(outcome);
                }
            }
        });
        Ok(handle)
    }
}

fn apply_discount(request: &str) -> anyhow::Result<String> {
    let mut payment: serde_json::Value =
        serde_json::from_str(request).context("request payload is not JSON")?;
    let amount = payment["amount"].as_u64().context("amount missing")?;
    let discount = amount / 10;
    payment["amount"] = (amount - discount).into();
    payment["loyaltyDiscount"] = discount.into();
    Ok(payment.to_string())
}

/// Post-transaction service: records the transaction in the background, no
/// response data.
struct ReceiptArchiver;

#[async_trait]
impl FlowServiceHandler for ReceiptArchiver {
    async fn process_request(
        &self,
        ctx: ServiceContext,
        request: String,
        _sender: Option<InternalData>,
    ) -> Result<(), ServiceError> {
        ctx.notify_background_processing().await;
        info!(payload = %request, "archiving transaction record");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        "  FSP - Flow Service Protocol demo\n  Version: {}\n",
        env!("CARGO_PKG_VERSION")
    );

    let hub = TransportHub::new();
    let registry = Arc::new(ServiceRegistry::new());

    let loyalty_endpoint = EndpointAddress::from("flow.loyalty");
    let _loyalty = FlowService::new(
        ServiceConfig::new("com.example.loyalty"),
        LoyaltyDiscount,
    )
    .with_activity_launcher(CustomerScreen)
    .serve(&hub, loyalty_endpoint.clone())
    .await?;
    registry.register(
        FlowServiceInfo::builder("com.example.loyalty")
            .with_vendor("Example Corp")
            .with_version("1.0.0")
            .with_display_name("Loyalty Discounts")
            .with_stages([FlowStage::PreTransaction])
            .with_capabilities(["loyalty"])
            .build()?,
        loyalty_endpoint,
    )?;

    let archive_endpoint = EndpointAddress::from("flow.archive");
    let _archive = FlowService::new(
        ServiceConfig::new("com.example.archive"),
        ReceiptArchiver,
    )
    .serve(&hub, archive_endpoint.clone())
    .await?;
    registry.register(
        FlowServiceInfo::builder("com.example.archive")
            .with_vendor("Example Corp")
            .with_version("1.0.0")
            .with_display_name("Receipt Archive")
            .with_stages([FlowStage::PostTransaction])
            .build()?,
        archive_endpoint,
    )?;

    let client = FlowClient::new(hub, registry, "com.example.pos");
    let mut payload = serde_json::json!({
        "amount": cli.amount,
        "currency": cli.currency,
    })
    .to_string();

    for stage in [FlowStage::PreTransaction, FlowStage::PostTransaction] {
        for service in client.services_for_stage(stage)? {
            info!(stage = %stage, service = %service.info.display_name, "dispatching");
            let stream = client
                .request(&service.info.id, payload.clone(), Some(stage))
                .await?;
            match stream.finish().await? {
                Some(response) => {
                    info!(stage = %stage, response = %response, "stage augmented the payment");
                    payload = response;
                }
                None => info!(stage = %stage, "stage finished with no response"),
            }
        }
    }

    println!("final payment payload: {payload}");
    Ok(())
}
