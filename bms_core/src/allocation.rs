//! Charger and load allocation.
//!
//! Each cycle both targets are re-evaluated from the ranked battery list and
//! the previous `AllocationState`. The priority order lives in two rule tables,
//! `CHARGER_RULES` and `LOAD_RULES`, applied top to bottom; every rule records
//! its diagnostic code in the `DecisionStatus` when it fires.

use bms_traits::{BatteryId, ChargingPhase, SwitchConfig};

use crate::battery::{BatteryRecord, FillState, HealthState};
use crate::config::{Strategy, Thresholds};
use crate::decision::DecisionStatus;
use crate::fixed_point::Soc;
use crate::ranking::Ranking;
use crate::snapshot::Snapshot;

/// SoC margin (whole percent) a candidate must beat before a target moves.
pub const REFINE_MARGIN_PCT: u16 = 5;

/// Process-wide allocation result, carried from one cycle to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationState {
    pub under_charge: Option<BatteryId>,
    pub under_load: Option<BatteryId>,
    pub charger_off: bool,
    pub decision: DecisionStatus,
}

impl AllocationState {
    pub fn clear_targets(&mut self) {
        self.under_charge = None;
        self.under_load = None;
    }

    /// Charge and load are connected to the same battery.
    pub fn shared(&self) -> bool {
        self.under_load.is_some() && self.under_load == self.under_charge
    }
}

/// What the rules may know about one battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryView {
    pub soc: Soc,
    pub fill: FillState,
    pub health: HealthState,
    pub phase: ChargingPhase,
}

impl BatteryView {
    pub fn collect(records: &[BatteryRecord], snap: &Snapshot) -> Vec<BatteryView> {
        records
            .iter()
            .map(|r| BatteryView {
                soc: r.soc(),
                fill: r.fill,
                health: r.health,
                phase: snap.phase(r.id()),
            })
            .collect()
    }
}

pub struct RuleContext<'a> {
    /// Present batteries, highest SoC first.
    pub ranked: &'a [BatteryId],
    /// Indexed by battery id.
    pub views: &'a [BatteryView],
    pub strategy: Strategy,
    /// Battery held out of service for OCV readings, if any.
    pub preserved: Option<BatteryId>,
    /// Charge target as already decided; only load rules look at it.
    pub charge: Option<BatteryId>,
}

impl RuleContext<'_> {
    fn view(&self, id: BatteryId) -> BatteryView {
        self.views[id.index()]
    }

    /// More than two batteries: one can sit isolated while others work.
    fn isolatable(&self) -> bool {
        self.ranked.len() > 2
    }

    fn highest_first(&self) -> impl Iterator<Item = BatteryId> + '_ {
        self.ranked.iter().copied()
    }

    fn lowest_first(&self) -> impl Iterator<Item = BatteryId> + '_ {
        self.ranked.iter().rev().copied()
    }

    fn is_weak(&self, id: BatteryId) -> bool {
        self.view(id).health == HealthState::Weak
    }

    fn is_normal(&self, id: BatteryId) -> bool {
        self.view(id).fill == FillState::Normal
    }

    fn is_preserved(&self, id: BatteryId) -> bool {
        self.preserved == Some(id)
    }

    /// Not already finished charging.
    fn wants_charge(&self, id: BatteryId) -> bool {
        !matches!(self.view(id).phase, ChargingPhase::Float | ChargingPhase::Rest)
    }

    /// Excluded from load duty because it is on the charger.
    fn is_charge_excluded(&self, id: BatteryId) -> bool {
        self.strategy.separate_load() && self.charge == Some(id)
    }
}

pub type ReleaseFn = fn(&RuleContext<'_>, BatteryId) -> bool;
pub type SelectFn = fn(&RuleContext<'_>) -> Option<BatteryId>;
pub type RefineFn = fn(&RuleContext<'_>, BatteryId) -> Option<BatteryId>;

#[derive(Clone, Copy)]
pub enum Rule {
    /// Drop the current target when the predicate holds.
    Release(ReleaseFn),
    /// Assign whenever the selector finds a battery, allocated or not.
    Override(SelectFn),
    /// Assign only while the target is unallocated.
    Fill(SelectFn),
    /// Given an allocated target, possibly move it.
    Refine(RefineFn),
}

#[derive(Clone, Copy)]
pub struct RuleEntry {
    pub name: &'static str,
    pub status: u16,
    pub rule: Rule,
}

// ── Charger rules ────────────────────────────────────────────────────────────

fn release_unless_normal(ctx: &RuleContext<'_>, target: BatteryId) -> bool {
    !ctx.is_normal(target)
}

fn lowest_if_critical(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    let lowest = ctx.lowest_first().next()?;
    (ctx.view(lowest).fill == FillState::Critical).then_some(lowest)
}

fn lowest_weak(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    ctx.lowest_first().find(|&id| ctx.is_weak(id))
}

fn lowest_chargeable_preserving(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    if !ctx.isolatable() {
        return None;
    }
    ctx.lowest_first()
        .find(|&id| ctx.wants_charge(id) && !ctx.is_preserved(id))
}

fn lowest_chargeable(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    ctx.lowest_first().find(|&id| ctx.wants_charge(id))
}

fn needier_chargeable(ctx: &RuleContext<'_>, target: BatteryId) -> Option<BatteryId> {
    if !ctx.is_normal(target) {
        return None;
    }
    let soc = ctx.view(target).soc;
    ctx.lowest_first().find(|&id| {
        ctx.wants_charge(id) && soc.exceeds_by(ctx.view(id).soc, REFINE_MARGIN_PCT)
    })
}

pub const CHARGER_RULES: &[RuleEntry] = &[
    RuleEntry {
        name: "release charger from non-normal battery",
        status: 0,
        rule: Rule::Release(release_unless_normal),
    },
    RuleEntry {
        name: "critical lowest battery",
        status: DecisionStatus::CRITICAL_PRIORITY,
        rule: Rule::Override(lowest_if_critical),
    },
    RuleEntry {
        name: "weak battery",
        status: DecisionStatus::WEAK_PRIORITY,
        rule: Rule::Override(lowest_weak),
    },
    RuleEntry {
        name: "lowest chargeable, preserving isolation",
        status: DecisionStatus::CHARGER_PRESERVING,
        rule: Rule::Fill(lowest_chargeable_preserving),
    },
    RuleEntry {
        name: "lowest chargeable",
        status: DecisionStatus::CHARGER_ANY,
        rule: Rule::Fill(lowest_chargeable),
    },
    RuleEntry {
        name: "needier chargeable battery",
        status: DecisionStatus::CHARGER_REFINED,
        rule: Rule::Refine(needier_chargeable),
    },
];

// ── Load rules ───────────────────────────────────────────────────────────────

fn release_if_charging(ctx: &RuleContext<'_>, target: BatteryId) -> bool {
    ctx.is_charge_excluded(target)
}

fn release_if_weak(ctx: &RuleContext<'_>, target: BatteryId) -> bool {
    ctx.is_weak(target)
}

fn highest_free_preserving(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    if !ctx.isolatable() {
        return None;
    }
    ctx.highest_first().find(|&id| {
        !ctx.is_weak(id) && !ctx.is_preserved(id) && !ctx.is_charge_excluded(id)
    })
}

fn highest_free(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    ctx.highest_first()
        .find(|&id| !ctx.is_weak(id) && !ctx.is_charge_excluded(id))
}

fn highest_not_weak(ctx: &RuleContext<'_>) -> Option<BatteryId> {
    ctx.highest_first().find(|&id| !ctx.is_weak(id))
}

/// A depleted load target moves to a free battery clearly fuller than the
/// charge target (or than itself when nothing is charging).
fn better_supplied(ctx: &RuleContext<'_>, target: BatteryId) -> Option<BatteryId> {
    if ctx.is_normal(target) {
        return None;
    }
    let reference = ctx.view(ctx.charge.unwrap_or(target)).soc;
    ctx.highest_first().find(|&id| {
        !ctx.is_weak(id)
            && !ctx.is_charge_excluded(id)
            && ctx.view(id).soc.exceeds_by(reference, REFINE_MARGIN_PCT)
    })
}

fn share_with_charger(ctx: &RuleContext<'_>, target: BatteryId) -> Option<BatteryId> {
    let charge = ctx.charge?;
    (!ctx.is_weak(charge) && ctx.view(target).fill == FillState::Critical).then_some(charge)
}

pub const LOAD_RULES: &[RuleEntry] = &[
    RuleEntry {
        name: "release load from charging battery",
        status: 0,
        rule: Rule::Release(release_if_charging),
    },
    RuleEntry {
        name: "release load from weak battery",
        status: 0,
        rule: Rule::Release(release_if_weak),
    },
    RuleEntry {
        name: "release load from non-normal battery",
        status: 0,
        rule: Rule::Release(release_unless_normal),
    },
    RuleEntry {
        name: "highest free battery, preserving isolation",
        status: DecisionStatus::LOAD_PRESERVING,
        rule: Rule::Fill(highest_free_preserving),
    },
    RuleEntry {
        name: "highest free battery",
        status: DecisionStatus::LOAD_ANY,
        rule: Rule::Fill(highest_free),
    },
    RuleEntry {
        name: "highest non-weak battery",
        status: DecisionStatus::LOAD_NOT_WEAK,
        rule: Rule::Fill(highest_not_weak),
    },
    RuleEntry {
        name: "better supplied battery",
        status: DecisionStatus::LOAD_REFINED,
        rule: Rule::Refine(better_supplied),
    },
    RuleEntry {
        name: "share charger battery",
        status: DecisionStatus::LOAD_SHARED,
        rule: Rule::Refine(share_with_charger),
    },
];

/// Run a rule table against `current`, returning the new target.
pub fn apply_rules(
    rules: &[RuleEntry],
    ctx: &RuleContext<'_>,
    mut current: Option<BatteryId>,
    status: &mut DecisionStatus,
) -> Option<BatteryId> {
    for entry in rules {
        let next = match (entry.rule, current) {
            (Rule::Release(pred), Some(t)) if pred(ctx, t) => {
                tracing::trace!(rule = entry.name, battery = %t, "released");
                current = None;
                continue;
            }
            (Rule::Override(select), _) => select(ctx),
            (Rule::Fill(select), None) => select(ctx),
            (Rule::Refine(refine), Some(t)) => refine(ctx, t),
            _ => None,
        };
        if let Some(b) = next {
            tracing::trace!(rule = entry.name, battery = %b, "assigned");
            status.set(entry.status);
            current = Some(b);
        }
    }
    current
}

/// Battery held out of service for OCV readings: the longest-isolated present
/// battery, when the strategy asks for it.
pub fn preserved_battery(records: &[BatteryRecord], strategy: Strategy) -> Option<BatteryId> {
    if !strategy.preserve_isolation() {
        return None;
    }
    let mut best: Option<&BatteryRecord> = None;
    for r in records.iter().filter(|r| !r.is_missing()) {
        if r.isolation_time > best.map_or(0, |b| b.isolation_time) {
            best = Some(r);
        }
    }
    best.map(BatteryRecord::id)
}

/// Batteries in Float whose SoC has sagged below the restart threshold.
pub fn float_restarts(ranking: &Ranking, views: &[BatteryView], th: &Thresholds) -> Vec<BatteryId> {
    ranking
        .present()
        .iter()
        .copied()
        .filter(|id| {
            let v = views[id.index()];
            v.phase == ChargingPhase::Float && v.soc < th.float_bulk_soc
        })
        .collect()
}

pub struct AllocationInput<'a> {
    pub ranking: &'a Ranking,
    pub views: &'a [BatteryView],
    pub battery_voltage: &'a [i32],
    pub panel_voltage: i32,
    pub thresholds: &'a Thresholds,
    pub strategy: Strategy,
    pub preserved: Option<BatteryId>,
}

/// Decide this cycle's charge and load targets.
pub fn allocate(prev: &AllocationState, input: &AllocationInput<'_>) -> AllocationState {
    let ranked = input.ranking.present();
    let views = input.views;
    let mut decision = DecisionStatus::default();
    let mut under_charge = prev.under_charge;
    let mut under_load = prev.under_load;

    // A finished battery hands the charger back.
    if under_charge.is_some_and(|id| {
        matches!(
            views[id.index()].phase,
            ChargingPhase::Float | ChargingPhase::Rest
        )
    }) {
        under_charge = None;
    }

    // At night the panel sits below every battery; keep the charger off.
    let panel_threshold = input
        .panel_voltage
        .saturating_add(input.thresholds.panel_margin);
    let mut charger_off = !ranked.iter().any(|id| {
        input
            .battery_voltage
            .get(id.index())
            .is_some_and(|&v| v < panel_threshold)
    });
    if !charger_off {
        decision.set(DecisionStatus::CHARGER_ON);
    }

    if ranked
        .iter()
        .all(|id| views[id.index()].phase == ChargingPhase::Float)
    {
        decision.set(DecisionStatus::ALL_FLOAT);
        charger_off = true;
    }
    if charger_off {
        under_charge = None;
    }

    match ranked {
        [] => {}
        [only] => {
            decision.set(DecisionStatus::SINGLE_BATTERY);
            under_charge = (!charger_off).then_some(*only);
            under_load = Some(*only);
            if views[only.index()].health == HealthState::Weak {
                decision.set(DecisionStatus::LOAD_NOT_WEAK);
                under_load = None;
            }
        }
        _ => {
            decision.set(DecisionStatus::MULTI_BATTERY);
            let mut ctx = RuleContext {
                ranked,
                views,
                strategy: input.strategy,
                preserved: input.preserved,
                charge: under_charge,
            };
            if !charger_off {
                under_charge = apply_rules(CHARGER_RULES, &ctx, under_charge, &mut decision);
            }
            ctx.charge = under_charge;
            under_load = apply_rules(LOAD_RULES, &ctx, under_load, &mut decision);
        }
    }

    AllocationState {
        under_charge,
        under_load,
        charger_off,
        decision,
    }
}

/// Switch settings that realise an allocation. Secondary loads are shed from
/// a critical battery; the charger is disconnected when it is too hot.
pub fn plan_switches(
    alloc: &AllocationState,
    records: &[BatteryRecord],
    temperature: i32,
    th: &Thresholds,
) -> SwitchConfig {
    let load_critical = alloc
        .under_load
        .and_then(|id| records.get(id.index()))
        .is_some_and(|r| r.fill == FillState::Critical);
    SwitchConfig {
        load1: if load_critical { None } else { alloc.under_load },
        load2: alloc.under_load,
        panel: if temperature < th.temperature_limit {
            alloc.under_charge
        } else {
            None
        },
    }
}
