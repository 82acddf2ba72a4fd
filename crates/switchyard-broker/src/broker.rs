use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use switchyard_auth::{AuthValidator, PlanCatalog, build_directory};
use switchyard_billing::UsageRecorder;
use switchyard_config::{BackendHealthConfig, Config, DEFAULT_STATIC_WEIGHT};
use switchyard_core::{
    BackendId, BackendProfile, Category, HealthSnapshot, HttpError, Outcome, Prompt, QuotaLimit, RoutingMode,
    SubscriptionContext, UsageRecord,
};
use switchyard_ratelimit::{QuotaStatus, QuotaTracker, RateLimitError, RateLimiter};
use switchyard_routing::{
    BackendRegistry, HealthTracker, ModelSelector, ScoredBackend, SessionAffinityTracker, TaskClassifier,
    WeightOverrideEngine, eligible_backends, estimate_tokens,
};
use switchyard_store::Store;
use switchyard_telemetry::BrokerMetrics;
use uuid::Uuid;

use crate::backend::{BackendSet, build_backends};
use crate::executor::{CandidatePool, Exhausted, RequestExecutor, Weights};
use crate::{BrokerError, HealthProbe, InvokeError};

/// One inference call as the caller expresses it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferRequest {
    pub prompt: Prompt,
    /// Conversation key for session affinity
    #[serde(default)]
    pub session_id: Option<String>,
    /// Overrides the plan's default routing mode
    #[serde(default)]
    pub mode: Option<RoutingMode>,
    /// Units charged against the daily quota, 1 when absent
    #[serde(default)]
    pub cost_units: Option<u32>,
}

/// How the serving backend was chosen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionMetadata {
    pub category: Category,
    pub mode: RoutingMode,
    /// The session's previous backend was reused without scoring
    pub affinity_hit: bool,
    pub attempts: u32,
    /// Effective weight of every eligible backend, empty when nothing was scored
    pub weights: BTreeMap<BackendId, f64>,
    /// First ranking computed for the request, best first
    pub scores: Vec<ScoredBackend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferResponse {
    pub request_id: Uuid,
    pub backend: BackendId,
    /// Generated text when the backend protocol carries one
    pub output: Option<String>,
    /// Backend response body
    pub response: serde_json::Value,
    pub latency_ms: u64,
    pub selection: SelectionMetadata,
}

/// Profile and live health of one backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    #[serde(flatten)]
    pub profile: BackendProfile,
    pub health: HealthSnapshot,
}

/// Live admission counters of one subscription; `None` means unlimited
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionCounters {
    pub subscription_id: String,
    pub plan_id: String,
    pub qps: u32,
    pub rate_tokens_remaining: Option<u32>,
    pub daily_quota: Option<u64>,
    pub quota_remaining: Option<u64>,
}

/// The inference pipeline
///
/// Classify, authenticate, filter eligible backends, admit (rate limit then
/// quota), consult session affinity, weight, score, execute with failover,
/// record usage.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    auth: AuthValidator,
    catalog: PlanCatalog,
    rate: RateLimiter,
    quota: QuotaTracker,
    classifier: TaskClassifier,
    affinity: SessionAffinityTracker,
    weights: WeightOverrideEngine,
    health: HealthTracker,
    registry: Arc<BackendRegistry>,
    executor: RequestExecutor,
    recorder: UsageRecorder,
    metrics: BrokerMetrics,
}

impl Broker {
    /// Build the pipeline with the backends described in configuration
    pub fn from_config(config: &Config, store: Arc<dyn Store>, recorder: UsageRecorder) -> anyhow::Result<Self> {
        let backends = build_backends(&config.backends).context("failed to initialize backends")?;
        Self::with_backends(config, store, recorder, backends)
    }

    /// Build the pipeline around an explicit set of invokers
    pub fn with_backends(
        config: &Config,
        store: Arc<dyn Store>,
        recorder: UsageRecorder,
        backends: BackendSet,
    ) -> anyhow::Result<Self> {
        let directory = build_directory(&config.auth.directory).context("failed to initialize subscription directory")?;
        let catalog = PlanCatalog::from_config(&config.plans);
        let auth = AuthValidator::new(directory, catalog.clone(), store.clone(), config.auth.cache_ttl);

        let health = HealthTracker::new(store.clone(), config.health);
        let metrics = BrokerMetrics::new();
        let executor = RequestExecutor::new(
            backends,
            health.clone(),
            ModelSelector::new(config.routing.scoring),
            metrics.clone(),
        );

        Ok(Self {
            inner: Arc::new(BrokerInner {
                auth,
                catalog,
                rate: RateLimiter::new(store.clone()),
                quota: QuotaTracker::new(store.clone()),
                classifier: TaskClassifier::new(config.routing.classifier),
                affinity: SessionAffinityTracker::new(store.clone(), config.routing.affinity),
                weights: WeightOverrideEngine::new(store, config.routing.weights.ttl),
                health,
                registry: Arc::new(BackendRegistry::from_config(&config.backends)),
                executor,
                recorder,
                metrics,
            }),
        })
    }

    /// Active prober over this broker's backends and health state
    pub fn health_probe(&self, config: &BackendHealthConfig) -> Result<HealthProbe, InvokeError> {
        HealthProbe::new(self.inner.registry.clone(), self.inner.health.clone(), config)
    }

    pub fn recorder(&self) -> &UsageRecorder {
        &self.inner.recorder
    }

    /// Serve one inference request
    #[tracing::instrument(name = "infer", skip_all, fields(session_id = request.session_id.as_deref()))]
    pub async fn infer(&self, credential: &str, request: InferRequest) -> Result<InferResponse, BrokerError> {
        let started = Instant::now();
        let result = self.run(credential, request, started).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        self.inner.metrics.request(outcome, started.elapsed());

        result
    }

    #[allow(clippy::too_many_lines)]
    async fn run(&self, credential: &str, request: InferRequest, started: Instant) -> Result<InferResponse, BrokerError> {
        let inner = &*self.inner;
        let request_id = Uuid::new_v4();

        let text = request.prompt.full_text();
        let estimated_tokens = estimate_tokens(&text);
        let detected = inner.classifier.classify(&text, estimated_tokens);

        let ctx = inner.auth.validate(credential).await?;

        let category = if ctx.routing.complexity_detection {
            detected
        } else {
            Category::Simple
        };
        let mode = request.mode.unwrap_or(ctx.routing.default_mode);
        let cost_units = request.cost_units.unwrap_or(1);

        let health = inner.health.snapshots(ctx.allowed_backends.keys()).await?;
        let eligible = eligible_backends(&inner.registry, &ctx, &health, estimated_tokens);
        if eligible.is_empty() {
            tracing::info!(
                subscription_id = %ctx.subscription_id,
                plan_id = %ctx.plan_id,
                estimated_tokens,
                "no eligible backend"
            );
            return Err(BrokerError::NoEligibleModel);
        }

        inner
            .rate
            .check(&ctx.subscription_id, ctx.qps)
            .await
            .map_err(|e| self.rejected(&ctx, e))?;
        inner
            .quota
            .consume(&ctx.subscription_id, ctx.daily_quota, cost_units)
            .await
            .map_err(|e| self.rejected(&ctx, e))?;

        let session_id = request
            .session_id
            .as_deref()
            .filter(|_| ctx.routing.session_continuity);
        let pinned = match session_id {
            Some(session_id) => self.resolve_affinity(session_id, &text, &ctx, &eligible).await,
            None => None,
        };
        let affinity_hit = pinned.is_some();

        tracing::debug!(
            subscription_id = %ctx.subscription_id,
            %category,
            %mode,
            candidates = eligible.len(),
            affinity_hit,
            "selecting backend"
        );

        // a pinned backend is tried without scoring, so weights wait for a failover
        let weights = if affinity_hit {
            Weights::deferred(Box::pin(self.effective_weights(&ctx, mode, category, &eligible)))
        } else {
            Weights::ready(self.effective_weights(&ctx, mode, category, &eligible).await)
        };

        let pool = CandidatePool {
            candidates: eligible.clone(),
            weights,
            priority: ctx.priority,
            pinned,
        };

        let record = UsageRecord {
            request_id,
            subscription_id: ctx.subscription_id.clone(),
            plan_id: ctx.plan_id.clone(),
            backend_id: None,
            category,
            cost_units,
            outcome: Outcome::Success,
            attempt_count: 0,
            latency_ms: 0,
            error: None,
            timestamp: jiff::Timestamp::now(),
        };

        match inner.executor.execute(&request.prompt, pool).await {
            Ok(execution) => {
                if let Some(session_id) = session_id
                    && let Err(e) = inner
                        .affinity
                        .record(session_id, &text, &execution.backend, ctx.routing.session_ttl)
                        .await
                {
                    tracing::warn!(session_id, error = %e, "failed to remember session backend");
                }

                let latency_ms = millis(execution.latency);

                inner.recorder.record(UsageRecord {
                    backend_id: Some(execution.backend.clone()),
                    attempt_count: execution.attempts,
                    latency_ms,
                    ..record
                });

                tracing::info!(
                    %request_id,
                    subscription_id = %ctx.subscription_id,
                    backend = %execution.backend,
                    attempts = execution.attempts,
                    latency_ms,
                    "request served"
                );

                Ok(InferResponse {
                    request_id,
                    backend: execution.backend,
                    output: execution.reply.output,
                    response: execution.reply.body,
                    latency_ms,
                    selection: SelectionMetadata {
                        category,
                        mode,
                        affinity_hit,
                        attempts: execution.attempts,
                        weights: execution.weights,
                        scores: execution.scores,
                    },
                })
            }
            Err(Exhausted { attempts, last, .. }) => {
                let error = match &last {
                    Some((backend, e)) if e.is_timeout() => BrokerError::UpstreamTimeout {
                        backend: backend.clone(),
                    },
                    _ => BrokerError::ServiceUnavailable { attempts },
                };

                inner.recorder.record(UsageRecord {
                    backend_id: last.as_ref().map(|(backend, _)| backend.clone()),
                    outcome: Outcome::Failed,
                    attempt_count: attempts,
                    latency_ms: millis(started.elapsed()),
                    error: Some(
                        last.as_ref()
                            .map_or_else(|| error.to_string(), |(_, e)| e.to_string()),
                    ),
                    ..record
                });

                tracing::warn!(
                    %request_id,
                    subscription_id = %ctx.subscription_id,
                    attempts,
                    error = %error,
                    "every candidate backend failed"
                );

                Err(error)
            }
        }
    }

    /// Weight of every eligible backend: the mode override when smart routing
    /// is on, else the plan's static weight
    async fn effective_weights(
        &self,
        ctx: &SubscriptionContext,
        mode: RoutingMode,
        category: Category,
        eligible: &[&BackendProfile],
    ) -> BTreeMap<BackendId, f64> {
        let overrides = if ctx.routing.smart_routing {
            self.inner
                .weights
                .weights_for(ctx, mode, category, &self.inner.registry)
                .await
        } else {
            BTreeMap::new()
        };

        eligible
            .iter()
            .map(|profile| {
                let weight = overrides
                    .get(&profile.id)
                    .copied()
                    .or_else(|| ctx.static_weight(&profile.id))
                    .unwrap_or(DEFAULT_STATIC_WEIGHT);
                (profile.id.clone(), weight)
            })
            .collect()
    }

    /// The session's previous backend, when it is still eligible
    async fn resolve_affinity(
        &self,
        session_id: &str,
        text: &str,
        ctx: &SubscriptionContext,
        eligible: &[&BackendProfile],
    ) -> Option<BackendId> {
        let resolved = self
            .inner
            .affinity
            .resolve(
                session_id,
                text,
                ctx.routing.correlation_threshold,
                ctx.routing.session_ttl,
            )
            .await;

        match resolved {
            Ok(Some(backend)) if eligible.iter().any(|p| p.id == backend) => Some(backend),
            Ok(Some(backend)) => {
                tracing::debug!(session_id, %backend, "session backend no longer eligible");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "session affinity unavailable");
                None
            }
        }
    }

    fn rejected(&self, ctx: &SubscriptionContext, error: RateLimitError) -> BrokerError {
        let reason = match &error {
            RateLimitError::Exceeded { .. } => "rate_limit",
            RateLimitError::QuotaExceeded { .. } => "quota",
            RateLimitError::Store(_) => return error.into(),
        };

        tracing::info!(
            subscription_id = %ctx.subscription_id,
            plan_id = %ctx.plan_id,
            reason,
            "request rejected at admission"
        );
        self.inner.metrics.rejected(&ctx.plan_id, reason);

        error.into()
    }

    /// Every registered backend with its current health
    pub async fn backends(&self) -> Result<Vec<BackendStatus>, BrokerError> {
        let mut statuses = Vec::with_capacity(self.inner.registry.len());
        for profile in self.inner.registry.profiles() {
            statuses.push(BackendStatus {
                profile: profile.clone(),
                health: self.inner.health.snapshot(&profile.id).await?,
            });
        }
        Ok(statuses)
    }

    /// Remaining rate-limit tokens and quota of a subscription on a plan
    ///
    /// `None` when the plan is unknown.
    pub async fn counters(
        &self,
        subscription_id: &str,
        plan_id: &str,
    ) -> Result<Option<SubscriptionCounters>, BrokerError> {
        let Some(plan) = self.inner.catalog.get(plan_id) else {
            return Ok(None);
        };

        let limit = plan.quota_limit();
        let rate_tokens_remaining = self.inner.rate.remaining(subscription_id, plan.qps).await?;
        let quota_remaining = match self.inner.quota.remaining(subscription_id, limit).await? {
            QuotaStatus::Unlimited => None,
            QuotaStatus::Remaining(n) => Some(n),
        };

        Ok(Some(SubscriptionCounters {
            subscription_id: subscription_id.to_owned(),
            plan_id: plan_id.to_owned(),
            qps: plan.qps,
            rate_tokens_remaining,
            daily_quota: match limit {
                QuotaLimit::Unlimited => None,
                QuotaLimit::Limited(n) => Some(n),
            },
            quota_remaining,
        }))
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("backends", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
