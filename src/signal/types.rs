//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Directional stance of an opinion or decision. `Flat` means no opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Long,
    Short,
    Flat,
}

impl Stance {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Stance::Long => Some(Direction::Long),
            Stance::Short => Some(Direction::Short),
            Stance::Flat => None,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Stance::Flat
    }
}

impl From<Direction> for Stance {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => Stance::Long,
            Direction::Short => Stance::Short,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stance::Long => write!(f, "long"),
            Stance::Short => write!(f, "short"),
            Stance::Flat => write!(f, "flat"),
        }
    }
}

/// Identifier of a signal provider, resolved once at configuration load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Rsi,
    Macd,
    Bollinger,
    EmaCrossover,
    VolumeSpike,
    SuperTrend,
    FvgFibonacci,
    OrderBlock,
    LiquiditySweep,
}

impl ProviderId {
    pub const ALL: [ProviderId; 9] = [
        ProviderId::Rsi,
        ProviderId::Macd,
        ProviderId::Bollinger,
        ProviderId::EmaCrossover,
        ProviderId::VolumeSpike,
        ProviderId::SuperTrend,
        ProviderId::FvgFibonacci,
        ProviderId::OrderBlock,
        ProviderId::LiquiditySweep,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Rsi => "rsi",
            ProviderId::Macd => "macd",
            ProviderId::Bollinger => "bollinger",
            ProviderId::EmaCrossover => "ema_crossover",
            ProviderId::VolumeSpike => "volume_spike",
            ProviderId::SuperTrend => "super_trend",
            ProviderId::FvgFibonacci => "fvg_fibonacci",
            ProviderId::OrderBlock => "order_block",
            ProviderId::LiquiditySweep => "liquidity_sweep",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static per-provider fusion weights. One field per provider, so a
/// configuration can never leave a provider without a weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderWeights {
    pub rsi: Decimal,
    pub macd: Decimal,
    pub bollinger: Decimal,
    pub ema_crossover: Decimal,
    pub volume_spike: Decimal,
    pub super_trend: Decimal,
    pub fvg_fibonacci: Decimal,
    pub order_block: Decimal,
    pub liquidity_sweep: Decimal,
}

impl ProviderWeights {
    /// Same weight for every provider
    pub fn uniform(weight: Decimal) -> Self {
        Self {
            rsi: weight,
            macd: weight,
            bollinger: weight,
            ema_crossover: weight,
            volume_spike: weight,
            super_trend: weight,
            fvg_fibonacci: weight,
            order_block: weight,
            liquidity_sweep: weight,
        }
    }

    pub fn get(&self, id: ProviderId) -> Decimal {
        match id {
            ProviderId::Rsi => self.rsi,
            ProviderId::Macd => self.macd,
            ProviderId::Bollinger => self.bollinger,
            ProviderId::EmaCrossover => self.ema_crossover,
            ProviderId::VolumeSpike => self.volume_spike,
            ProviderId::SuperTrend => self.super_trend,
            ProviderId::FvgFibonacci => self.fvg_fibonacci,
            ProviderId::OrderBlock => self.order_block,
            ProviderId::LiquiditySweep => self.liquidity_sweep,
        }
    }

    pub fn set(&mut self, id: ProviderId, weight: Decimal) {
        let slot = match id {
            ProviderId::Rsi => &mut self.rsi,
            ProviderId::Macd => &mut self.macd,
            ProviderId::Bollinger => &mut self.bollinger,
            ProviderId::EmaCrossover => &mut self.ema_crossover,
            ProviderId::VolumeSpike => &mut self.volume_spike,
            ProviderId::SuperTrend => &mut self.super_trend,
            ProviderId::FvgFibonacci => &mut self.fvg_fibonacci,
            ProviderId::OrderBlock => &mut self.order_block,
            ProviderId::LiquiditySweep => &mut self.liquidity_sweep,
        };
        *slot = weight;
    }

    pub fn total(&self) -> Decimal {
        ProviderId::ALL.iter().map(|id| self.get(*id)).sum()
    }
}

impl Default for ProviderWeights {
    fn default() -> Self {
        Self {
            rsi: dec!(0.15),
            macd: dec!(0.15),
            bollinger: dec!(0.15),
            ema_crossover: dec!(0.25),
            volume_spike: dec!(0.25),
            super_trend: dec!(0.20),
            fvg_fibonacci: dec!(0.25),
            order_block: dec!(0.20),
            liquidity_sweep: dec!(0.20),
        }
    }
}

/// One provider's directional judgment for a symbol in one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opinion {
    /// Provider that produced the opinion
    pub provider: ProviderId,
    /// Symbol evaluated
    pub symbol: String,
    /// Long, short, or flat (no opinion)
    pub stance: Stance,
    /// Conviction in [0, 1]
    pub strength: Decimal,
    /// Last close seen by the provider
    pub price: Decimal,
    /// Human-readable explanation
    pub rationale: String,
}

impl Opinion {
    /// Create an opinion. Strength is clamped into [0, 1].
    pub fn new(
        provider: ProviderId,
        symbol: impl Into<String>,
        stance: Stance,
        strength: Decimal,
        price: Decimal,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            symbol: symbol.into(),
            stance,
            strength: strength.clamp(Decimal::ZERO, Decimal::ONE),
            price,
            rationale: rationale.into(),
        }
    }

    /// A provider with nothing to say
    pub fn flat(provider: ProviderId, symbol: impl Into<String>, price: Decimal) -> Self {
        Self::new(provider, symbol, Stance::Flat, Decimal::ZERO, price, "no signal")
    }

    /// Map onto [0, 1]: long 0.5 + 0.5s, short 0.5 - 0.5s, flat 0.5
    pub fn sub_score(&self) -> Decimal {
        let half = dec!(0.5);
        match self.stance {
            Stance::Long => half + half * self.strength,
            Stance::Short => half - half * self.strength,
            Stance::Flat => half,
        }
    }
}

/// Filters in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Trend,
    Session,
    Regime,
    News,
    Dedup,
}

impl FilterKind {
    pub const CHAIN: [FilterKind; 5] = [
        FilterKind::Trend,
        FilterKind::Session,
        FilterKind::Regime,
        FilterKind::News,
        FilterKind::Dedup,
    ];
}

/// What a single filter did to a candidate decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum FilterVerdict {
    Passed,
    Vetoed(String),
    /// Filter switched off in configuration
    Disabled,
    /// An earlier filter already vetoed, or nothing to filter
    NotEvaluated,
}

/// Recorded outcome of one filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub filter: FilterKind,
    pub verdict: FilterVerdict,
}

impl FilterOutcome {
    pub fn is_veto(&self) -> bool {
        matches!(self.verdict, FilterVerdict::Vetoed(_))
    }
}

/// The engine's final verdict for one symbol in one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision identifier
    pub id: Uuid,
    pub symbol: String,
    /// Final direction after filters
    pub stance: Stance,
    /// Direction from fusion alone, before filters
    pub candidate: Stance,
    /// Weighted composite in [0, 1], 0.5 neutral
    pub score: Decimal,
    pub long_votes: usize,
    pub short_votes: usize,
    pub opinions: Vec<Opinion>,
    pub filters: Vec<FilterOutcome>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_actionable(&self) -> bool {
        !self.stance.is_flat()
    }

    /// Reason for the first veto, if any
    pub fn veto_reason(&self) -> Option<&str> {
        self.filters.iter().find_map(|o| match &o.verdict {
            FilterVerdict::Vetoed(reason) => Some(reason.as_str()),
            _ => None,
        })
    }
}
