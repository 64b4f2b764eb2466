//! Batch Scheduler - main processing loop
//!
//! Owns every engine component and drives them from the host's tick.
//!
//! # Tick Loop
//!
//! 1. On every K-th tick, visit up to N items from the registry cursor
//! 2. When the cursor passes the end of the epoch: recompute the credit
//!    ratio, flush the epoch tally to the notification sink, wrap the cursor
//! 3. In resource-gated mode, reclaim a bounded number of stale orders
//! 4. Emit a profile report if one is due, then advance the clock
//!
//! # Per-Item Processing
//!
//! ```text
//! stale? ── yes ──> unregister, log StaleReference
//!   │
//! pending / terminal? ── yes ──> skip
//!   │
//! producer: work delta ──> accrue ──> crossings (self attempts)
//! consumer: distribute ──> attempts
//!   │
//! resolve ──> advanced? ──> direct: mutate
//!                           gated:  find_available ──> reserve ──> mutate
//! ```
//!
//! A single item never aborts a batch; every per-item failure is recorded in
//! the event log and processing continues.
//!
//! # Determinism
//!
//! All randomness goes through one seeded `RngManager`. Same seed, same
//! catalog and same host inputs produce the same transitions.

use crate::config::{EngineConfig, ProfilingConfig};
use crate::core::CycleClock;
use crate::credit::CreditLedger;
use crate::error::EngineError;
use crate::host::{EpochSummary, Host, ItemSource, MetricSource, MutationOutcome};
use crate::models::{
    Event, EventLog, ItemId, ItemObservation, TierCatalog, TierChain, TrackedItem,
};
use crate::profiler::{ProfileReport, Profiler, Section};
use crate::registry::Registry;
use crate::reservation::{OrderId, ReservationError, ReservationManager};
use crate::rng::RngManager;
use crate::scheduler::checkpoint::{
    compute_config_hash, new_snapshot_id, validate_snapshot, ItemSnapshot, OrderSnapshot,
    StateSnapshot,
};
use crate::transition::{Resolution, TransitionEngine, TransitionState};
use serde::Serialize;

// ============================================================================
// Results & Stats
// ============================================================================

/// Result of a single tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickResult {
    /// Tick number
    pub tick: u64,

    /// Whether this was a batch tick
    pub batch_ran: bool,

    /// Items taken from the cursor (skipped items included)
    pub visited: usize,

    /// Transitions applied synchronously
    pub transitions: usize,

    /// Transitions handed to the host for out-of-band completion
    pub deferred: usize,

    /// The cursor completed a full pass during this tick
    pub epoch_completed: bool,

    /// Orders reclaimed by the pending scan
    pub reclaimed: usize,
}

/// Running counters, cleared by `reset_stats`
#[derive(Debug, Clone, Default)]
struct Counters {
    epochs_completed: u64,
    transitions: u64,
    deferred_transitions: u64,
    mutation_failures: u64,
    stale_references: u64,
    reservations_unavailable: u64,
}

/// Engine statistics for status displays
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub tick: u64,
    pub tracked: usize,
    pub producers: usize,
    pub consumers: usize,
    pub credit_pool: f64,
    pub credit_ratio: f64,
    pub epochs_completed: u64,
    pub transitions: u64,
    pub deferred_transitions: u64,
    pub mutation_failures: u64,
    pub stale_references: u64,
    pub reservations_unavailable: u64,
    pub outstanding_orders: usize,
    pub events_dropped: u64,
}

/// Hashed together for checkpoint validation
#[derive(Serialize)]
struct HashedSetup<'a> {
    config: &'a EngineConfig,
    catalog: &'a TierCatalog,
}

// ============================================================================
// Batch Scheduler
// ============================================================================

/// Amortized tier-advancement scheduler
///
/// The scheduler owns all engine state; the host only supplies the
/// collaborator traits on each call.
///
/// # Example
///
/// ```rust
/// use tier_ladder_engine::config::EngineConfig;
/// use tier_ladder_engine::host::InMemoryHost;
/// use tier_ladder_engine::models::{Category, TierCatalog};
/// use tier_ladder_engine::BatchScheduler;
///
/// let catalog = TierCatalog::linear(&["normal", "uncommon", "rare"]);
/// let mut scheduler = BatchScheduler::new(EngineConfig::default(), catalog).unwrap();
///
/// let mut host = InMemoryHost::new();
/// let drill = host.spawn("drill", Category::Producer, "normal");
/// scheduler.on_created(&host, &drill);
///
/// for _ in 0..100 {
///     scheduler.tick(&mut host);
/// }
/// assert_eq!(scheduler.stats().tick, 100);
/// ```
pub struct BatchScheduler {
    config: EngineConfig,
    catalog: TierCatalog,
    chain: TierChain,
    registry: Registry,
    ledger: CreditLedger,
    transitions: TransitionEngine,
    /// Present only in resource-gated mode
    reservations: Option<ReservationManager>,
    rng: RngManager,
    clock: CycleClock,
    event_log: EventLog,
    profiler: Profiler,
    counters: Counters,
    /// Epochs completed since construction (not reset with stats)
    epoch: u64,
    epoch_tally: EpochSummary,
}

impl BatchScheduler {
    /// Create a scheduler
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidConfig` - option out of range
    /// * `EngineError::ConfigInconsistency` - tier catalog is not a single
    ///   chain; scheduling must not begin
    pub fn new(config: EngineConfig, catalog: TierCatalog) -> Result<Self, EngineError> {
        config.validate()?;
        let chain = TierChain::build(&catalog, config.cost_scaling_factor)?;

        let transitions =
            TransitionEngine::new(config.base_chance(), config.accumulation_rate, &chain);
        let reservations = config
            .resource_gated
            .then(|| ReservationManager::new(&chain));

        tracing::debug!(
            tiers = chain.len(),
            weighted = chain.is_weighted(),
            gated = config.resource_gated,
            "scheduler created"
        );

        Ok(Self {
            ledger: CreditLedger::new(config.base_threshold),
            rng: RngManager::new(config.rng_seed),
            clock: CycleClock::new(config.cycle_period_ticks),
            profiler: Profiler::new(&config.profiling),
            registry: Registry::new(),
            event_log: EventLog::with_capacity_limit(config.event_log_capacity),
            counters: Counters::default(),
            epoch: 0,
            epoch_tally: EpochSummary::new(1),
            transitions,
            reservations,
            chain,
            catalog,
            config,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn chain(&self) -> &TierChain {
        &self.chain
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn item(&self, id: ItemId) -> Option<&TrackedItem> {
        self.registry.get(id)
    }

    pub fn credit_pool(&self) -> f64 {
        self.ledger.pool()
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn reservations(&self) -> Option<&ReservationManager> {
        self.reservations.as_ref()
    }

    pub fn current_tick(&self) -> u64 {
        self.clock.current_tick()
    }

    /// Epochs completed since construction
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Hand buffered events to the host
    ///
    /// The log keeps at most `event_log_capacity` events; hosts that need
    /// all of them drain at least that often.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.event_log.drain()
    }

    pub fn profile_report(&self) -> ProfileReport {
        self.profiler.report()
    }

    pub fn reset_profiler(&mut self) {
        self.profiler.reset();
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            tick: self.clock.current_tick(),
            tracked: self.registry.count(),
            producers: self.registry.producer_count(),
            consumers: self.registry.consumer_count(),
            credit_pool: self.ledger.pool(),
            credit_ratio: self.ledger.ratio(),
            epochs_completed: self.counters.epochs_completed,
            transitions: self.counters.transitions,
            deferred_transitions: self.counters.deferred_transitions,
            mutation_failures: self.counters.mutation_failures,
            stale_references: self.counters.stale_references,
            reservations_unavailable: self.counters.reservations_unavailable,
            outstanding_orders: self.reservations.as_ref().map_or(0, |r| r.outstanding()),
            events_dropped: self.event_log.dropped(),
        }
    }

    pub fn reset_stats(&mut self) {
        self.counters = Counters::default();
    }

    // ========================================================================
    // Tick Loop
    // ========================================================================

    /// Execute one host cycle
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// for _ in 0..600 {
    ///     let result = scheduler.tick(&mut host);
    ///     if result.epoch_completed {
    ///         println!("epoch done at tick {}", result.tick);
    ///     }
    /// }
    /// ```
    pub fn tick<H: Host + ?Sized>(&mut self, host: &mut H) -> TickResult {
        let tick = self.clock.current_tick();
        let mut result = TickResult {
            tick,
            ..Default::default()
        };

        if self.clock.is_batch_tick() {
            result.batch_ran = true;
            self.run_batch(host, &mut result);
        }

        if self.reservations.is_some() {
            result.reclaimed = self.reclaim_orders(&*host);
        }

        if self.profiler.report_due(tick) {
            self.profiler.log_report(tick);
        }

        self.clock.advance_tick();
        result
    }

    fn run_batch<H: Host + ?Sized>(&mut self, host: &mut H, result: &mut TickResult) {
        let started = self.profiler.start(Section::BatchProcessing);

        if self.registry.epoch_exhausted() {
            // Nothing was pending (empty registry or everything removed)
            self.start_epoch();
        }

        while result.visited < self.config.batch_size {
            let Some(id) = self.registry.next_in_epoch() else {
                break;
            };
            result.visited += 1;
            self.visit(host, id, result);
        }

        if result.visited > 0 && self.registry.epoch_exhausted() {
            self.complete_epoch(host);
            result.epoch_completed = true;
        }

        self.profiler.finish(Section::BatchProcessing, started);
    }

    fn start_epoch(&mut self) {
        self.registry.begin_epoch();
        self.ledger.recompute_ratio(
            self.registry.producer_count(),
            self.registry.consumer_count(),
        );
    }

    fn complete_epoch<H: Host + ?Sized>(&mut self, host: &mut H) {
        let tick = self.clock.current_tick();
        self.epoch += 1;
        self.counters.epochs_completed += 1;

        let tally = std::mem::replace(&mut self.epoch_tally, EpochSummary::new(self.epoch + 1));
        if !tally.is_empty() {
            host.epoch_summary(&tally);
        }

        self.event_log.log(Event::EpochComplete {
            tick,
            epoch: self.epoch,
            transitions: tally.total(),
            pool: self.ledger.pool(),
        });
        tracing::debug!(
            tick,
            epoch = self.epoch,
            transitions = tally.total(),
            pool = self.ledger.pool(),
            "epoch complete"
        );

        self.start_epoch();
    }

    // ========================================================================
    // Per-Item Processing
    // ========================================================================

    fn visit<H: Host + ?Sized>(&mut self, host: &mut H, id: ItemId, result: &mut TickResult) {
        if !host.is_valid(id) {
            self.drop_stale(id);
            return;
        }
        let Some(item) = self.registry.get_mut(id) else {
            return;
        };

        if item.is_pending() {
            // Direct-mode deferrals have no order; the host tells us when
            // they are over
            if item.pending_order().is_none() && !host.is_awaiting(id) {
                self.settle_deferral(&*host, id);
            }
            return;
        }

        let terminal = self.chain.is_terminal(item.tier());
        if terminal && !self.config.continue_at_terminal {
            return;
        }

        let attempts = if item.is_producer() {
            let Some(counter) = host.work_counter(id) else {
                self.drop_stale(id);
                return;
            };
            let unit_cost = host.unit_cost(id);
            let crossings = self.accrue_producer(id, counter, unit_cost);
            if self.config.producer_self_attempts && !terminal {
                crossings
            } else {
                0
            }
        } else if terminal {
            0
        } else {
            let started = self.profiler.start(Section::ConsumerProcessing);
            let attempts = self
                .ledger
                .distribute(self.registry.consumer_count(), &mut self.rng);
            self.profiler.finish(Section::ConsumerProcessing, started);
            attempts
        };

        if attempts > 0 {
            self.attempt_transition(host, id, attempts, result);
        }
    }

    /// Adopt the tier the host reports once a direct-mode deferral is over
    ///
    /// The host may have completed it under the same id (the item moves up)
    /// or dropped it (the tier is unchanged). Items now on the terminal tier
    /// leave tracking unless continue-at-terminal is on.
    fn settle_deferral<M: MetricSource + ?Sized>(&mut self, host: &M, id: ItemId) {
        let observed = host
            .tier_name(id)
            .and_then(|name| self.chain.ordinal_of(&name));
        let base = self.transitions.base_chance();
        let Some(item) = self.registry.get_mut(id) else {
            return;
        };
        item.clear_pending();

        let Some(tier) = observed else {
            self.drop_stale(id);
            return;
        };
        if tier <= item.tier() {
            return;
        }
        item.set_tier(tier);
        item.set_transition_chance(base);
        tracing::debug!(item = %id, tier, "deferred transition settled");

        if self.chain.is_terminal(tier) && !self.config.continue_at_terminal {
            self.on_destroyed(id);
        }
    }

    fn drop_stale(&mut self, id: ItemId) {
        let tick = self.clock.current_tick();
        if self.registry.unregister(id).is_some() {
            self.counters.stale_references += 1;
            self.event_log.log(Event::StaleReference { tick, item_id: id });
            tracing::debug!(tick, item = %id, "stale reference dropped");
        }
    }

    /// Credit a producer's counter delta; returns threshold crossings
    fn accrue_producer(&mut self, id: ItemId, counter: f64, unit_cost: f64) -> u32 {
        let started = self.profiler.start(Section::ProducerProcessing);
        let Some(item) = self.registry.get_mut(id) else {
            return 0;
        };

        let baseline = item.metric_baseline();
        // A counter that went backwards (host reset) only rebaselines
        let delta = if counter >= baseline {
            (counter - baseline) * unit_cost
        } else {
            0.0
        };
        item.set_metric_baseline(counter);

        let accrual = self.ledger.accrue(item, delta, &self.chain);
        self.profiler.finish(Section::ProducerProcessing, started);
        accrual.crossings
    }

    fn attempt_transition<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        id: ItemId,
        attempts: u32,
        result: &mut TickResult,
    ) {
        let Some(item) = self.registry.get(id) else {
            return;
        };
        let state = TransitionState {
            tier: item.tier(),
            chance: item.transition_chance(),
            attempts: 0,
        };

        let started = self.profiler.start(Section::TransitionAttempts);
        let resolution = self.transitions.resolve(state, attempts, &mut self.rng);
        self.profiler.finish(Section::TransitionAttempts, started);

        let Some(item) = self.registry.get_mut(id) else {
            return;
        };
        item.add_attempts(resolution.state.attempts);
        if !resolution.advanced() {
            item.set_transition_chance(resolution.state.chance);
            return;
        }

        if self.reservations.is_some() {
            self.gated_transition(host, id, resolution, result);
        } else {
            self.direct_transition(host, id, resolution, result);
        }
    }

    fn direct_transition<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        id: ItemId,
        resolution: Resolution,
        result: &mut TickResult,
    ) {
        let Some(item) = self.registry.get(id).cloned() else {
            return;
        };
        let Some(destination) = self.chain.tier(resolution.state.tier).cloned() else {
            return;
        };

        let started = self.profiler.start(Section::MutationOperations);
        let outcome = host.mutate(&item, &destination);
        self.profiler.finish(Section::MutationOperations, started);

        match outcome {
            Ok(MutationOutcome::Replaced(observation)) => {
                self.apply_replacement(&*host, &item, observation, resolution.state.chance);
                result.transitions += 1;
            }
            Ok(MutationOutcome::Deferred) => {
                self.mark_deferred(&item, resolution.state.tier, None);
                result.deferred += 1;
            }
            Err(err) => {
                self.record_mutation_failure(&item, resolution.state.tier, &err.reason);
            }
        }
    }

    fn gated_transition<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        id: ItemId,
        resolution: Resolution,
        result: &mut TickResult,
    ) {
        let tick = self.clock.current_tick();
        let Some(item) = self.registry.get(id).cloned() else {
            return;
        };
        let ceiling = resolution.state.tier;

        let started = self.profiler.start(Section::ReservationOperations);
        let pools = host.pools_for(&item);
        let mut reserved = None;
        if let Some(reservations) = self.reservations.as_mut() {
            for pool in &pools {
                if let Some(tier) =
                    reservations.find_available(&*host, pool, item.kind(), item.tier(), ceiling)
                {
                    let order = reservations.reserve(pool, item.kind(), tier, id);
                    reserved = Some((order, tier));
                    break;
                }
            }
        }
        self.log_drift();
        self.profiler.finish(Section::ReservationOperations, started);

        let Some((order_id, tier)) = reserved else {
            // Nothing to consume: the item keeps its tier and chance
            self.counters.reservations_unavailable += 1;
            self.event_log.log(Event::ReservationUnavailable {
                tick,
                item_id: id,
                kind: item.kind().to_string(),
                from: self.chain.name_of(item.tier()).to_string(),
                ceiling: self.chain.name_of(ceiling).to_string(),
            });
            return;
        };
        let Some(destination) = self.chain.tier(tier).cloned() else {
            return;
        };

        let started = self.profiler.start(Section::MutationOperations);
        let outcome = host.mutate(&item, &destination);
        self.profiler.finish(Section::MutationOperations, started);

        match outcome {
            Ok(MutationOutcome::Replaced(observation)) => {
                if let Some(reservations) = self.reservations.as_mut() {
                    if let Err(err) = reservations.confirm(order_id) {
                        tracing::debug!(
                            tick,
                            item = %id,
                            error = %err,
                            "confirm after replacement failed"
                        );
                    }
                }
                let chance = if tier == ceiling {
                    resolution.state.chance
                } else {
                    self.transitions.base_chance()
                };
                self.apply_replacement(&*host, &item, observation, chance);
                result.transitions += 1;
            }
            Ok(MutationOutcome::Deferred) => {
                self.mark_deferred(&item, tier, Some(order_id));
                result.deferred += 1;
            }
            Err(err) => {
                if let Some(reservations) = self.reservations.as_mut() {
                    if let Err(err) = reservations.cancel(order_id) {
                        tracing::debug!(
                            tick,
                            item = %id,
                            error = %err,
                            "cancel after failed mutation failed"
                        );
                    }
                }
                self.record_mutation_failure(&item, tier, &err.reason);
            }
        }
    }

    fn log_drift(&mut self) {
        let tick = self.clock.current_tick();
        let Some(reservations) = self.reservations.as_mut() else {
            return;
        };
        for drift in reservations.take_drift() {
            self.event_log.log(Event::ReservationDrift {
                tick,
                pool: drift.pool,
                resource: drift.resource,
                tier: drift.tier,
                available: drift.available,
                reserved: drift.reserved,
            });
        }
    }

    /// The host swapped `old` for a new entity
    fn apply_replacement<M: MetricSource + ?Sized>(
        &mut self,
        host: &M,
        old: &TrackedItem,
        replacement: ItemObservation,
        chance: f64,
    ) {
        let tick = self.clock.current_tick();
        self.registry.unregister(old.id());
        self.counters.transitions += 1;
        self.epoch_tally.record(old.kind(), &replacement.tier_name);

        self.event_log.log(Event::Transitioned {
            tick,
            item_id: old.id(),
            new_item_id: replacement.id,
            kind: old.kind().to_string(),
            from: self.chain.name_of(old.tier()).to_string(),
            to: replacement.tier_name.clone(),
        });

        self.track(host, &replacement, chance);
    }

    fn mark_deferred(&mut self, item: &TrackedItem, tier: usize, order_id: Option<OrderId>) {
        let tick = self.clock.current_tick();
        if let Some(tracked) = self.registry.get_mut(item.id()) {
            tracked.set_pending(order_id);
        }
        self.counters.deferred_transitions += 1;
        let to = self.chain.name_of(tier).to_string();
        self.epoch_tally.record(item.kind(), &to);

        self.event_log.log(Event::TransitionDeferred {
            tick,
            item_id: item.id(),
            kind: item.kind().to_string(),
            from: self.chain.name_of(item.tier()).to_string(),
            to,
            order_id,
        });
    }

    fn record_mutation_failure(&mut self, item: &TrackedItem, tier: usize, reason: &str) {
        let tick = self.clock.current_tick();
        self.registry.unregister(item.id());
        self.counters.mutation_failures += 1;
        let from = self.chain.name_of(item.tier()).to_string();
        let to = self.chain.name_of(tier).to_string();

        tracing::warn!(
            tick,
            item = %item.id(),
            kind = item.kind(),
            from = %from,
            to = %to,
            reason,
            "mutation failed, item dropped from tracking"
        );
        self.event_log.log(Event::MutationFailure {
            tick,
            item_id: item.id(),
            kind: item.kind().to_string(),
            from,
            to,
            reason: reason.to_string(),
        });
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register an observed entity with `chance`
    ///
    /// Unknown tiers are ignored; terminal tiers only qualify when
    /// continue-at-terminal is on.
    fn track<M: MetricSource + ?Sized>(
        &mut self,
        host: &M,
        observation: &ItemObservation,
        chance: f64,
    ) -> bool {
        let Some(tier) = self.chain.ordinal_of(&observation.tier_name) else {
            return false;
        };
        if self.chain.is_terminal(tier) && !self.config.continue_at_terminal {
            return false;
        }

        let mut item = TrackedItem::new(
            observation.id,
            &observation.kind,
            observation.category,
            tier,
            chance,
        );
        if item.is_producer() {
            item.set_metric_baseline(host.work_counter(observation.id).unwrap_or(0.0));
        }

        let (_, inserted) = self.registry.register(item);
        if inserted {
            self.event_log.log(Event::Registered {
                tick: self.clock.current_tick(),
                item_id: observation.id,
                kind: observation.kind.clone(),
                tier: observation.tier_name.clone(),
            });
        }
        inserted
    }

    /// Host created a qualifying entity; returns true if it is now tracked
    pub fn on_created<M: MetricSource + ?Sized>(
        &mut self,
        host: &M,
        observation: &ItemObservation,
    ) -> bool {
        let base = self.transitions.base_chance();
        self.track(host, observation, base)
    }

    /// Host destroyed an entity
    pub fn on_destroyed(&mut self, id: ItemId) -> bool {
        if self.registry.unregister(id).is_some() {
            self.event_log.log(Event::Unregistered {
                tick: self.clock.current_tick(),
                item_id: id,
            });
            true
        } else {
            false
        }
    }

    /// Host copied an entity; the clone inherits the source's chance
    pub fn on_cloned<M: MetricSource + ?Sized>(
        &mut self,
        host: &M,
        source: ItemId,
        observation: &ItemObservation,
    ) -> bool {
        let chance = self
            .registry
            .get(source)
            .map_or(self.transitions.base_chance(), |item| item.transition_chance());
        self.track(host, observation, chance)
    }

    /// Administrative resync
    ///
    /// Drops the registry and the credit pool and rebuilds both from a full
    /// enumeration. Outstanding reservations are kept and their items are
    /// flagged pending again.
    pub fn resync<S>(&mut self, source: &S)
    where
        S: ItemSource + MetricSource + ?Sized,
    {
        self.registry.clear();
        self.ledger.reset();

        let base = self.transitions.base_chance();
        for observation in source.enumerate() {
            self.track(source, &observation, base);
        }

        if let Some(reservations) = self.reservations.as_ref() {
            for order in reservations.orders() {
                if let Some(item) = self.registry.get_mut(order.item_id) {
                    item.set_pending(Some(order.id));
                }
            }
        }

        self.start_epoch();
        let tick = self.clock.current_tick();
        self.event_log.log(Event::Resynced {
            tick,
            items: self.registry.count(),
        });
        tracing::info!(tick, items = self.registry.count(), "registry resynced");
    }

    /// Rebuild the chain after the host's tier catalog changed
    ///
    /// Items are remapped to the new ordinals by tier name. Items whose tier
    /// vanished (or became terminal without continue-at-terminal) leave
    /// tracking.
    ///
    /// # Errors
    ///
    /// `EngineError::ConfigInconsistency` if the new catalog is not a valid
    /// chain. The previous chain stays in effect.
    pub fn on_catalog_changed(&mut self, catalog: TierCatalog) -> Result<(), EngineError> {
        let chain = match TierChain::build(&catalog, self.config.cost_scaling_factor) {
            Ok(chain) => chain,
            Err(err) => {
                tracing::warn!(error = %err, "tier catalog rejected, keeping previous chain");
                return Err(err);
            }
        };
        let tick = self.clock.current_tick();
        let remap: Vec<Option<usize>> = self
            .chain
            .iter()
            .map(|tier| chain.ordinal_of(&tier.name))
            .collect();

        let mut dropped = Vec::new();
        for item in self.registry.iter_mut() {
            match remap.get(item.tier()).copied().flatten() {
                Some(tier) if !chain.is_terminal(tier) || self.config.continue_at_terminal => {
                    item.set_tier(tier)
                }
                _ => dropped.push(item.id()),
            }
        }
        for id in &dropped {
            self.on_destroyed(*id);
        }

        if let Some(reservations) = self.reservations.as_mut() {
            let orphaned = reservations.rebuild(&chain, |old| remap.get(old).copied().flatten());
            for order in orphaned {
                if let Some(item) = self.registry.get_mut(order.item_id) {
                    item.clear_pending();
                }
            }
        }

        self.transitions.rebuild(&chain);
        self.event_log.log(Event::ChainRebuilt {
            tick,
            tiers: chain.len(),
            dropped_items: dropped.len(),
        });
        tracing::info!(
            tick,
            tiers = chain.len(),
            dropped = dropped.len(),
            "tier chain rebuilt"
        );
        self.chain = chain;
        self.catalog = catalog;
        Ok(())
    }

    // ========================================================================
    // Reservation Signals
    // ========================================================================

    /// External signal: the consuming action for `order_id` completed
    ///
    /// The item moves to the reserved tier. If the host also replaced the
    /// entity it reports that through `on_destroyed` / `on_created`.
    pub fn confirm_order(&mut self, order_id: OrderId) -> Result<(), EngineError> {
        let order = self
            .reservations
            .as_mut()
            .ok_or(ReservationError::UnknownOrder(order_id))?
            .confirm(order_id)?;
        let tick = self.clock.current_tick();
        let base = self.transitions.base_chance();

        let mut leaves_tracking = false;
        if let Some(item) = self.registry.get_mut(order.item_id) {
            if item.pending_order() == Some(order_id) {
                item.clear_pending();
                item.set_tier(order.tier);
                item.set_transition_chance(base);
                leaves_tracking =
                    self.chain.is_terminal(order.tier) && !self.config.continue_at_terminal;
            }
        }
        self.counters.transitions += 1;
        self.event_log.log(Event::OrderConfirmed {
            tick,
            order_id,
            item_id: order.item_id,
        });
        if leaves_tracking {
            self.on_destroyed(order.item_id);
        }
        Ok(())
    }

    /// External signal: the consuming action for `order_id` was aborted
    pub fn cancel_order(&mut self, order_id: OrderId) -> Result<(), EngineError> {
        let order = self
            .reservations
            .as_mut()
            .ok_or(ReservationError::UnknownOrder(order_id))?
            .cancel(order_id)?;
        self.release_item(order.item_id, order_id);
        self.event_log.log(Event::OrderCancelled {
            tick: self.clock.current_tick(),
            order_id,
            item_id: order.item_id,
        });
        Ok(())
    }

    fn release_item(&mut self, item_id: ItemId, order_id: OrderId) {
        if let Some(item) = self.registry.get_mut(item_id) {
            if item.pending_order() == Some(order_id) {
                item.clear_pending();
            }
        }
    }

    fn reclaim_orders<H: Host + ?Sized>(&mut self, host: &H) -> usize {
        let limit = self.config.pending_scan_limit;
        let Some(reservations) = self.reservations.as_mut() else {
            return 0;
        };
        let reclaimed = reservations.process_pending(host, limit);
        let tick = self.clock.current_tick();
        for order in &reclaimed {
            self.release_item(order.item_id, order.id);
            self.event_log.log(Event::OrderReclaimed {
                tick,
                order_id: order.id,
                item_id: order.item_id,
            });
            tracing::debug!(tick, order = %order.id, item = %order.item_id, "order reclaimed");
        }
        reclaimed.len()
    }

    // ========================================================================
    // Checkpoint
    // ========================================================================

    /// Hash of the options that shape scheduling
    ///
    /// Profiling and event retention are left out so they can be changed
    /// across a restore.
    fn setup_hash(config: &EngineConfig, catalog: &TierCatalog) -> Result<String, EngineError> {
        let config = EngineConfig {
            profiling: ProfilingConfig::default(),
            event_log_capacity: 0,
            ..config.clone()
        };
        compute_config_hash(&HashedSetup {
            config: &config,
            catalog,
        })
    }

    /// Capture the complete logical state
    pub fn save_checkpoint(&self) -> Result<StateSnapshot, EngineError> {
        let (orders, next_order_id) = match self.reservations.as_ref() {
            Some(reservations) => (
                reservations
                    .orders()
                    .map(|order| OrderSnapshot::capture(order, &self.chain))
                    .collect(),
                reservations.next_order_id(),
            ),
            None => (Vec::new(), 1),
        };

        Ok(StateSnapshot {
            snapshot_id: new_snapshot_id(),
            current_tick: self.clock.current_tick(),
            epoch: self.epoch,
            rng_state: self.rng.get_state(),
            items: self
                .registry
                .iter()
                .map(|item| ItemSnapshot::capture(item, &self.chain))
                .collect(),
            cursor: self.registry.cursor(),
            epoch_end: self.registry.epoch_end(),
            credit_pool: self.ledger.pool(),
            credit_ratio: self.ledger.ratio(),
            epoch_tally: self.epoch_tally.clone(),
            orders,
            next_order_id,
            config_hash: Self::setup_hash(&self.config, &self.catalog)?,
        })
    }

    /// Restore a scheduler from a snapshot
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidConfig` - config or catalog differ from the
    ///   ones the snapshot was taken with
    /// * `EngineError::StateValidation` - snapshot violates an invariant
    pub fn load_checkpoint(
        config: EngineConfig,
        catalog: TierCatalog,
        snapshot: StateSnapshot,
    ) -> Result<Self, EngineError> {
        let mut scheduler = Self::new(config, catalog)?;

        let expected = Self::setup_hash(&scheduler.config, &scheduler.catalog)?;
        if snapshot.config_hash != expected {
            return Err(EngineError::InvalidConfig(format!(
                "Config hash mismatch: snapshot {} vs current {}",
                snapshot.config_hash, expected
            )));
        }
        validate_snapshot(&snapshot, &scheduler.chain)?;

        for item in snapshot.items {
            if let Some(item) = item.restore(&scheduler.chain) {
                scheduler.registry.register(item);
            }
        }
        scheduler
            .registry
            .restore_cursor(snapshot.cursor, snapshot.epoch_end);
        scheduler
            .registry
            .check_invariants()
            .map_err(EngineError::StateValidation)?;

        scheduler.ledger.set_pool(snapshot.credit_pool);
        scheduler.ledger.set_ratio(snapshot.credit_ratio);

        if scheduler.config.resource_gated {
            let orders = snapshot
                .orders
                .into_iter()
                .filter_map(|order| order.restore(&scheduler.chain))
                .collect();
            scheduler.reservations = Some(ReservationManager::from_orders(
                &scheduler.chain,
                orders,
                snapshot.next_order_id,
            ));
        }

        scheduler.rng = RngManager::new(snapshot.rng_state);
        scheduler.clock =
            CycleClock::resume_at(scheduler.config.cycle_period_ticks, snapshot.current_tick);
        scheduler.epoch = snapshot.epoch;
        scheduler.epoch_tally = snapshot.epoch_tally;

        tracing::info!(
            snapshot = %snapshot.snapshot_id,
            tick = snapshot.current_tick,
            items = scheduler.registry.count(),
            "checkpoint restored"
        );
        Ok(scheduler)
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("tick", &self.clock.current_tick())
            .field("epoch", &self.epoch)
            .field("tracked", &self.registry.count())
            .field("pool", &self.ledger.pool())
            .field("gated", &self.reservations.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
