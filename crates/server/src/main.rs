//! Gateway server binary.
//!
//! Startup order matters: database and cache first, then the initial
//! metagraph sync (authenticated requests are refused until one snapshot
//! exists, unless the chain fallback is explicitly enabled), then the
//! background loops, then the listener.
//!
//! Exit codes: 0 success, 64 usage, 70 software, 75 temporary dependency
//! failure.

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use gateway_chain::{sync, ChainView, MetagraphSource, SubtensorRpc, Verifier};
use gateway_epoch::EpochScheduler;
use gateway_s3::{CredentialMinter, ValidatorUploadService};
use gateway_server::api;
use gateway_server::{AppState, Args, Authenticator, RateLimiter, RedisCounterStore};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const EXIT_USAGE: u8 = 64;
const EXIT_SOFTWARE: u8 = 70;
const EXIT_TEMPFAIL: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gateway=debug".parse().expect("static directive"))
                .add_directive("info".parse().expect("static directive")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // clap renders its own message for --help/--version.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Usage(msg)) => {
            error!("{}", msg);
            ExitCode::from(EXIT_USAGE)
        }
        Err(RunError::Dependency(msg)) => {
            error!("{}", msg);
            ExitCode::from(EXIT_TEMPFAIL)
        }
        Err(RunError::Software(err)) => {
            error!("{:#}", err);
            ExitCode::from(EXIT_SOFTWARE)
        }
    }
}

enum RunError {
    Usage(String),
    Dependency(String),
    Software(anyhow::Error),
}

async fn run(args: Args) -> Result<(), RunError> {
    info!("Gateway starting for netuid {} on {}", args.netuid, args.bt_network);

    let scheme = args
        .signature_scheme()
        .map_err(RunError::Usage)?;

    // Backing stores.
    let db = gateway_store::init_pool(&args.database_url, 10)
        .await
        .map_err(|e| RunError::Dependency(format!("database connect failed: {e}")))?;
    gateway_store::bootstrap_schema(&db)
        .await
        .map_err(|e| RunError::Dependency(format!("schema bootstrap failed: {e}")))?;

    let counter_store = RedisCounterStore::connect(&args.redis_url)
        .await
        .map_err(|e| RunError::Dependency(format!("redis connect failed: {e}")))?;
    let limiter = RateLimiter::new(
        Arc::new(counter_store),
        args.rate_limits(),
        args.enable_rate_limiting,
    );

    // Chain view and initial sync.
    let chain = Arc::new(ChainView::new(args.metagraph_max_stale));
    let source: Arc<dyn MetagraphSource> = Arc::new(
        SubtensorRpc::new(
            &args.chain_endpoint(),
            Duration::from_secs(args.validator_verification_timeout),
        )
        .map_err(|e| RunError::Dependency(format!("chain client init failed: {e}")))?,
    );

    match sync::initial_sync(&chain, source.as_ref(), args.netuid, 5).await {
        Ok(()) => {}
        Err(e) if args.chain_fallback_enabled => {
            // Explicitly configured to serve with per-request chain queries.
            tracing::warn!("Initial metagraph sync failed ({e}); relying on chain fallback");
        }
        Err(e) => {
            return Err(RunError::Dependency(format!(
                "initial metagraph sync failed: {e}"
            )));
        }
    }
    sync::spawn_sync_task(
        chain.clone(),
        source.clone(),
        args.netuid,
        Duration::from_secs(args.metagraph_sync_interval),
    );

    // Epoch scheduler loops.
    let scheduler = Arc::new(EpochScheduler::new(
        db.clone(),
        args.selector_config(),
        args.scheduler_config(),
    ));
    scheduler.clone().spawn();
    scheduler.clone().spawn_retention();

    // Credential minting.
    let minter = CredentialMinter::new(args.s3_config());
    let uploads = ValidatorUploadService::new(minter.clone(), args.validator_upload_ttl_seconds);

    let auth = Authenticator::new(
        chain.clone(),
        source,
        Verifier::new(scheme),
        args.auth_config(),
    );

    let addr = format!("{}:{}", args.host, args.port);
    let state = Arc::new(
        AppState::new(auth, limiter, minter, uploads, scheduler, chain, db, args)
            .map_err(RunError::Software)?,
    );

    let app = Router::new()
        .route("/healthcheck", get(api::meta::healthcheck))
        .route("/rate-limits", get(api::meta::rate_limits))
        .route("/commitment-formats", get(api::meta::commitment_formats))
        .route("/structure-info", get(api::meta::structure_info))
        .route("/docs", get(api::meta::docs))
        .route("/openapi.json", get(api::meta::openapi))
        .route("/get-folder-access", post(api::access::get_folder_access))
        .route("/get-validator-access", post(api::access::get_validator_access))
        .route(
            "/get-miner-specific-access",
            post(api::access::get_miner_specific_access),
        )
        .route(
            "/api/v1/s3-access/validator-upload",
            post(api::access::validator_upload),
        )
        .route(
            "/api/v1/s3-access/validator-uploads",
            get(api::access::validator_uploads),
        )
        .route(
            "/api/v1/zipcode-assignments/current",
            get(api::assignments::current_assignment),
        )
        .route(
            "/api/v1/zipcode-assignments/epoch/:id",
            get(api::assignments::historical_assignment),
        )
        .route(
            "/api/v1/zipcode-assignments/stats",
            get(api::assignments::assignment_stats),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            gateway_server::monitor::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RunError::Dependency(format!("bind {addr} failed: {e}")))?;
    info!("Gateway ready at http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| RunError::Software(e.into()))?;

    Ok(())
}
