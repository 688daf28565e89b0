#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Glucose forecasting and insulin dose recommendation.
//!
//! The engine is a pure function of a `PredictionSnapshot`: no clock reads,
//! no I/O, no state kept between calls. Hosts gather history through
//! `glyco_traits::HistoryProvider` (see `assemble`) or build snapshots
//! directly.
//!
//! ## Architecture
//!
//! - **Curves**: insulin activity and carb absorption shapes (`curves`)
//! - **Effects**: insulin (`insulin`), carbs (`carbs`), momentum (`momentum`),
//!   retrospective correction (`retrospective`)
//! - **Forecast**: composition on a fixed grid (`predictor`)
//! - **Dosing**: rule-based recommendation under limits (`recommender`)
//! - **Facade**: `Engine::forecast` and `Engine::evaluate` (`engine`)
//!
//! Times are `DateTime<Utc>`; internally effects work in fractional minutes.

pub mod assemble;
pub mod carbs;
pub mod config;
pub mod conversions;
pub mod curves;
pub mod engine;
pub mod error;
pub mod insulin;
pub mod momentum;
pub mod predictor;
pub mod provider_error;
pub mod providers;
pub mod recommender;
pub mod retrospective;
pub mod snapshot;
pub mod util;
pub mod warning;

pub use assemble::assemble_snapshot;
pub use carbs::CarbAbsorption;
pub use config::*;
pub use curves::{CarbCurve, CurvePoint, Elapsed, InsulinCurve};
pub use engine::{EffectSummary, Engine, EngineOutput, Forecast};
pub use error::{BuildError, EngineError, Result};
pub use predictor::{EffectBreakdown, GlucoseTrajectory, TrajectoryPoint};
pub use providers::{InMemoryHistory, StaticParameters};
pub use recommender::{DoseAction, DoseRecommendation, Rationale, Rule};
pub use snapshot::{PredictionSnapshot, SnapshotBuilder};
pub use warning::{DoseLimit, Warning};

pub use glyco_traits::{CarbEntry, DoseKind, GlucoseReading, InsulinDose, Provenance};
