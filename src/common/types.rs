//! Market snapshot types shared by every stage of the pipeline

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::America::New_York;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Aggressor side of order-flow events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowSide {
    Buy,
    Sell,
}

impl FlowSide {
    /// Direction of a trade that follows this flow
    pub fn follow(self) -> Side {
        match self {
            FlowSide::Buy => Side::Long,
            FlowSide::Sell => Side::Short,
        }
    }

    /// Direction of a trade that fades this flow once it has been absorbed
    pub fn fade(self) -> Side {
        self.follow().opposite()
    }
}

impl std::fmt::Display for FlowSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowSide::Buy => write!(f, "BUY"),
            FlowSide::Sell => write!(f, "SELL"),
        }
    }
}

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Largest of the upper and lower wick
    pub fn max_wick(&self) -> Decimal {
        let body_top = self.open.max(self.close);
        let body_bottom = self.open.min(self.close);
        (self.high - body_top).max(body_bottom - self.low)
    }
}

/// Stacked bid/ask imbalance across consecutive price rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedImbalance {
    pub side: FlowSide,
    pub rows: u32,
}

/// Passive liquidity soaking up aggressive orders of `side`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absorption {
    pub side: FlowSide,
    pub price: Decimal,
}

/// Hidden size repeatedly refilled at one price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iceberg {
    pub side: FlowSide,
    pub price: Decimal,
}

/// Order-flow aggregates and events for the current bar
///
/// Events are detected upstream; the engine only reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderFlow {
    pub aggressive_buy_volume: Decimal,
    pub aggressive_sell_volume: Decimal,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
    pub cumulative_delta: Decimal,
    pub delta_burst: bool,
    pub delta_flip: bool,
    pub cvd_divergence: bool,
    pub quotes_speed_up: bool,
    pub stacked_imbalance: Option<StackedImbalance>,
    pub absorption: Option<Absorption>,
    pub iceberg: Option<Iceberg>,
}

impl OrderFlow {
    /// Aggressive buy minus aggressive sell volume
    pub fn net_delta(&self) -> Decimal {
        self.aggressive_buy_volume - self.aggressive_sell_volume
    }

    pub fn aggressive_volume(&self) -> Decimal {
        self.aggressive_buy_volume + self.aggressive_sell_volume
    }
}

/// Externally supplied reference levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Vwap,
    VwapSd1Upper,
    VwapSd1Lower,
    VwapSd2Upper,
    VwapSd2Lower,
    ValueAreaHigh,
    ValueAreaLow,
    PointOfControl,
    LowVolumeNodeHigh,
    LowVolumeNodeLow,
    CallWall,
    PutWall,
    GammaFlip,
    VolTrigger,
    PreviousHigh,
    PreviousLow,
}

/// Level map plus free-form blind-spot levels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelMap {
    pub levels: BTreeMap<LevelKind, Decimal>,
    pub blind_spots: Vec<Decimal>,
}

impl LevelMap {
    pub fn get(&self, kind: LevelKind) -> Option<Decimal> {
        self.levels.get(&kind).copied()
    }

    pub fn set(&mut self, kind: LevelKind, price: Decimal) {
        self.levels.insert(kind, price);
    }

    pub fn with(mut self, kind: LevelKind, price: Decimal) -> Self {
        self.set(kind, price);
        self
    }
}

/// Options-derived dealer positioning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsSnapshot {
    /// Net dealer gamma (normalized, sign carries direction)
    pub net_gamma: f64,
    pub put_call_ratio: f64,
    pub call_volume: f64,
    pub put_volume: f64,
    /// Dealers just crossed the gamma flip
    pub gamma_flip_active: bool,
}

/// Correlation with the paired index future
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSymbolSnapshot {
    pub correlation: f64,
    #[serde(default)]
    pub divergence: f64,
    /// Symbol currently leading the pair, if known
    #[serde(default)]
    pub leader: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySnapshot {
    pub vix: f64,
    #[serde(default)]
    pub rising: bool,
}

/// Trading session phase, derived from the snapshot hour in New York time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    AfterHours,
    PreMarket,
    LondonOpen,
    NyOpen,
    Lunch,
    Afternoon,
    Close,
}

impl SessionPhase {
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        match ts.with_timezone(&New_York).hour() {
            0..=3 => SessionPhase::AfterHours,
            4..=7 => SessionPhase::PreMarket,
            8..=9 => SessionPhase::LondonOpen,
            10..=11 => SessionPhase::NyOpen,
            12..=13 => SessionPhase::Lunch,
            14..=15 => SessionPhase::Afternoon,
            16..=17 => SessionPhase::Close,
            _ => SessionPhase::AfterHours,
        }
    }

    /// Historical edge of the phase, in [0, 1]
    pub fn performance(self) -> f64 {
        match self {
            SessionPhase::LondonOpen => 0.65,
            SessionPhase::NyOpen => 0.75,
            SessionPhase::Lunch => 0.45,
            SessionPhase::Afternoon => 0.60,
            SessionPhase::Close => 0.50,
            SessionPhase::AfterHours => 0.40,
            SessionPhase::PreMarket => 0.50,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::AfterHours => "after_hours",
            SessionPhase::PreMarket => "pre_market",
            SessionPhase::LondonOpen => "london_open",
            SessionPhase::NyOpen => "ny_open",
            SessionPhase::Lunch => "lunch",
            SessionPhase::Afternoon => "afternoon",
            SessionPhase::Close => "close",
        };
        write!(f, "{}", name)
    }
}

/// Immutable per-tick snapshot handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Current bar; its close is the evaluation price
    pub bar: Bar,
    /// Earlier bars, oldest first, bounded by the producer
    #[serde(default)]
    pub history: Vec<Bar>,
    pub tick_size: Decimal,
    #[serde(default)]
    pub order_flow: OrderFlow,
    #[serde(default)]
    pub levels: LevelMap,
    #[serde(default)]
    pub options: Option<OptionsSnapshot>,
    #[serde(default)]
    pub cross_symbol: Option<CrossSymbolSnapshot>,
    #[serde(default)]
    pub volatility: Option<VolatilitySnapshot>,
}

impl MarketContext {
    pub fn price(&self) -> Decimal {
        self.bar.close
    }

    pub fn level(&self, kind: LevelKind) -> Option<Decimal> {
        self.levels.get(kind)
    }

    /// History followed by the current bar
    pub fn bars(&self) -> impl Iterator<Item = &Bar> + '_ {
        self.history.iter().chain(std::iter::once(&self.bar))
    }

    pub fn bar_count(&self) -> usize {
        self.history.len() + 1
    }

    /// The last `n` bars including the current one, oldest first
    pub fn recent_bars(&self, n: usize) -> Vec<&Bar> {
        let total = self.bar_count();
        self.bars().skip(total.saturating_sub(n)).collect()
    }

    pub fn session_phase(&self) -> SessionPhase {
        SessionPhase::from_timestamp(self.timestamp)
    }

    /// Tick size as f64, never zero
    pub fn tick(&self) -> f64 {
        let tick = to_f64(self.tick_size);
        if tick > 0.0 {
            tick
        } else {
            0.25
        }
    }

    /// Largest wick of the current bar in ticks
    pub fn last_wick_ticks(&self) -> f64 {
        to_f64(self.bar.max_wick()) / self.tick()
    }
}

/// Lossy projection used by the analytics layer
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Inverse of [`to_f64`] for prices emitted in signals
pub fn from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(6))
        .unwrap_or_default()
}
