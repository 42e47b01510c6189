use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use notifier_core::delivery::{DeliveryChannel, LogDelivery, Reply, WebhookDelivery};
use notifier_core::scheduler::SchedulerState;
use notifier_core::subscribers::{FileSubscriberStore, Subscriber, SubscriberStore};
use notifier_core::{
    CommandHandler, CowinClient, FixedIntervalPacer, LocationIndex, NotificationScheduler,
    NotifierConfig, NotifierSettings, UserId,
};

/// Application state shared across REST API handlers
#[derive(Clone)]
struct AppState {
    handler: Arc<CommandHandler>,
    scheduler: Arc<NotificationScheduler>,
    store: Arc<dyn SubscriberStore>,
}

#[derive(Serialize, ToSchema)]
struct HealthRes {
    status: String,
    /// `idle` or `sweeping`
    scheduler: String,
}

#[derive(Deserialize, ToSchema)]
struct MessageReq {
    /// Chat platform user id of the sender
    user_id: String,
    /// Raw message text, including the trigger word
    content: String,
}

#[derive(Serialize, ToSchema)]
struct ReportEntryDto {
    heading: String,
    body: String,
}

#[derive(Serialize, ToSchema)]
struct ReplyDto {
    /// `text` or `report`
    kind: String,
    /// Plain-text rendering, always present
    text: String,
    title: Option<String>,
    entries: Vec<ReportEntryDto>,
}

impl From<Reply> for ReplyDto {
    fn from(reply: Reply) -> Self {
        let text = reply.render_text();
        match reply {
            Reply::Text(_) => ReplyDto {
                kind: "text".into(),
                text,
                title: None,
                entries: Vec::new(),
            },
            Reply::Report(report) => ReplyDto {
                kind: "report".into(),
                text,
                title: Some(report.title),
                entries: report
                    .entries
                    .into_iter()
                    .map(|e| ReportEntryDto {
                        heading: e.heading,
                        body: e.body,
                    })
                    .collect(),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
struct MessageRes {
    /// False when the message was not addressed to the bot
    handled: bool,
    replies: Vec<ReplyDto>,
}

#[derive(Serialize, ToSchema)]
struct SubscriberDto {
    user_id: String,
    location: String,
    age_tier: String,
}

impl From<Subscriber> for SubscriberDto {
    fn from(s: Subscriber) -> Self {
        SubscriberDto {
            user_id: s.user_id.to_string(),
            location: s.preference.label(),
            age_tier: s.age_tier.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ListSubscribersRes {
    subscribers: Vec<SubscriberDto>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, post_message, list_subscribers),
    components(schemas(
        HealthRes,
        MessageReq,
        MessageRes,
        ReplyDto,
        ReportEntryDto,
        ListSubscribersRes,
        SubscriberDto
    ))
)]
struct ApiDoc;

/// Main entry point for the notifier service
///
/// Loads the district index, opens the subscriber store and then runs two things concurrently:
/// - the notification scheduler, sweeping every `NOTIFIER_SWEEP_INTERVAL_SECS`
/// - a REST server (configurable via `NOTIFIER_REST_ADDR`) that accepts chat messages from a
///   transport bridge and returns the bot's replies
///
/// A district index that cannot be loaded is fatal.
///
/// # Environment Variables
/// See `NotifierSettings::from_env_values` for the full list. The most common are:
/// - `NOTIFIER_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `NOTIFIER_DISTRICTS_FILE`: district index (default: "data/districts.json")
/// - `NOTIFIER_SUBSCRIBERS_FILE`: subscriber store (default: "data/subscribers.yaml")
/// - `NOTIFIER_WEBHOOK_URL`: where notifications are POSTed (default: log only)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notifier=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = NotifierSettings::from_env_values(|key| std::env::var(key).ok())?;
    let config = NotifierConfig::new(settings)?;
    let rest_addr = config.rest_addr().to_owned();

    let index = Arc::new(LocationIndex::load(config.districts_file())?);
    let store: Arc<dyn SubscriberStore> =
        Arc::new(FileSubscriberStore::open(config.subscribers_file())?);
    let cowin = Arc::new(CowinClient::new(
        config.api_base_url(),
        config.api_token().map(str::to_owned),
        config.request_timeout(),
    )?);
    let channel: Arc<dyn DeliveryChannel> = match config.webhook_url() {
        Some(url) => Arc::new(WebhookDelivery::new(url, config.request_timeout())?),
        None => Arc::new(LogDelivery),
    };

    let handler = Arc::new(CommandHandler::new(
        &config,
        index.clone(),
        cowin.clone(),
        store.clone(),
        cowin.clone(),
    ));
    let scheduler = Arc::new(NotificationScheduler::new(
        &config,
        index,
        cowin,
        store.clone(),
        channel,
        Arc::new(FixedIntervalPacer::new(config.delivery_pacing())),
    ));

    tracing::info!("++ Starting notifier REST on {}", rest_addr);

    let sweeper = scheduler.clone();
    let scheduler_task = tokio::spawn(async move { sweeper.run_forever().await });

    let rest_app = Router::new()
        .route("/health", get(health))
        .route("/messages", post(post_message))
        .route("/subscribers", get(list_subscribers))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            handler,
            scheduler,
            store,
        });

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, rest_app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down");
        })
        .await?;

    scheduler_task.abort();
    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Reports that the service is up and whether a sweep is currently running.
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    let scheduler = match state.scheduler.state() {
        SchedulerState::Idle => "idle",
        SchedulerState::Sweeping => "sweeping",
    };
    Json(HealthRes {
        status: "ok".into(),
        scheduler: scheduler.into(),
    })
}

#[utoipa::path(
    post,
    path = "/messages",
    request_body = MessageReq,
    responses(
        (status = 200, description = "Replies to send back to the user", body = MessageRes),
        (status = 400, description = "Bad request")
    )
)]
/// Handle one inbound chat message
///
/// The transport bridge posts every message it sees. Messages not starting with the trigger word
/// come back with `handled: false` and no replies. Command failures are not HTTP errors: they
/// become ordinary text replies.
///
/// # Returns
/// * `Ok(Json<MessageRes>)` - Replies in the order they should be sent
/// * `Err((StatusCode, &str))` - Bad request if the user id is empty
async fn post_message(
    State(state): State<AppState>,
    Json(req): Json<MessageReq>,
) -> Result<Json<MessageRes>, (StatusCode, &'static str)> {
    let user_id =
        UserId::new(&req.user_id).map_err(|_| (StatusCode::BAD_REQUEST, "user_id is required"))?;
    let today = chrono::Local::now().date_naive();

    let res = match state.handler.handle(&user_id, &req.content, today).await {
        Some(replies) => MessageRes {
            handled: true,
            replies: replies.into_iter().map(ReplyDto::from).collect(),
        },
        None => MessageRes {
            handled: false,
            replies: Vec::new(),
        },
    };
    Ok(Json(res))
}

#[utoipa::path(
    get,
    path = "/subscribers",
    responses(
        (status = 200, description = "All subscribers", body = ListSubscribersRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List every subscriber with their saved location and age tier
async fn list_subscribers(
    State(state): State<AppState>,
) -> Result<Json<ListSubscribersRes>, (StatusCode, &'static str)> {
    match state.store.list_all().await {
        Ok(subscribers) => Ok(Json(ListSubscribersRes {
            subscribers: subscribers.into_iter().map(SubscriberDto::from).collect(),
        })),
        Err(e) => {
            tracing::error!("List subscribers error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}
