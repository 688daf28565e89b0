//! Text and JSON rendering of engine results.

use glyco_core::{
    DoseAction, DoseRecommendation, EffectSummary, EngineOutput, EngineSettings, Forecast,
    GlucoseTrajectory, Warning,
};
use std::fmt::Write as _;

/// Trajectory rows shown in text mode, in minutes.
const TEXT_STEP_MIN: f64 = 30.0;

pub fn describe_action(action: &DoseAction) -> String {
    match action {
        DoseAction::NoAction => "no action".to_string(),
        DoseAction::Bolus { units } => format!("bolus {units:.2} U"),
        DoseAction::TempBasal {
            rate_u_per_hr,
            duration_min,
        } => format!("temp basal {rate_u_per_hr:.2} U/h for {duration_min:.0} min"),
        DoseAction::CancelTempBasal => "cancel temp basal".to_string(),
    }
}

fn summary_text(out: &mut String, s: &EffectSummary) {
    let _ = writeln!(
        out,
        "Glucose {:.0} mg/dL at {}  IOB {:.2} U  COB {:.1} g  basal {:.2} U/h",
        s.glucose_mg_dl,
        s.glucose_at.to_rfc3339(),
        s.iob_units,
        s.cob_grams,
        s.scheduled_basal_rate
    );
    if let Some(m) = &s.momentum {
        let _ = writeln!(out, "Momentum {:+.2} mg/dL/min", m.slope);
    }
    if let Some(r) = &s.retrospective {
        let _ = writeln!(out, "Retrospective bias {:+.1} mg/dL", r.bias_mg_dl);
    }
    for c in &s.carb_absorption {
        let _ = writeln!(
            out,
            "Carbs {:.0} g at {}: {:.1} g absorbed, {:.1} g left",
            c.grams,
            c.timestamp.to_rfc3339(),
            c.absorbed_grams,
            c.remaining_grams
        );
    }
}

fn trajectory_text(out: &mut String, t: &GlucoseTrajectory) {
    let every = (TEXT_STEP_MIN / t.interval_min).round().max(1.0) as usize;
    let _ = writeln!(
        out,
        "Forecast ({} points every {:.0} min):",
        t.points().len(),
        t.interval_min
    );
    let n = t.points().len();
    for (i, p) in t.points().iter().enumerate() {
        if i % every == 0 || i + 1 == n {
            let offset = i as f64 * t.interval_min;
            let _ = writeln!(out, "  +{offset:>4.0} min  {:>6.1}", p.mg_dl);
        }
    }
}

fn warnings_text(out: &mut String, warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    let _ = writeln!(out, "Warnings:");
    for w in warnings {
        let _ = writeln!(out, "  - {w}");
    }
}

fn recommendation_text(out: &mut String, r: &DoseRecommendation) {
    let _ = writeln!(
        out,
        "Recommendation: {} ({:?})",
        describe_action(&r.action),
        r.rationale.rule
    );
    if !r.rationale.note.is_empty() {
        let _ = writeln!(out, "  {}", r.rationale.note);
    }
}

pub fn forecast(f: &Forecast, json: bool) -> eyre::Result<String> {
    if json {
        return Ok(serde_json::to_string(f)?);
    }
    let mut out = String::new();
    summary_text(&mut out, &f.summary);
    trajectory_text(&mut out, &f.trajectory);
    warnings_text(&mut out, &f.warnings);
    Ok(out)
}

pub fn recommendation(o: &EngineOutput, json: bool) -> eyre::Result<String> {
    if json {
        return Ok(serde_json::to_string(o)?);
    }
    let mut out = String::new();
    summary_text(&mut out, &o.summary);
    trajectory_text(&mut out, &o.trajectory);
    recommendation_text(&mut out, &o.recommendation);
    warnings_text(&mut out, &o.warnings);
    Ok(out)
}

pub fn settings(s: &EngineSettings, json: bool) -> eyre::Result<String> {
    if json {
        return Ok(serde_json::json!({ "status": "ok", "settings": s }).to_string());
    }
    let mut out = String::from("Config OK\n");
    let _ = writeln!(
        out,
        "ISF {:.0} mg/dL/U  CR {:.1} g/U  target {:.0}-{:.0} mg/dL",
        s.patient.insulin_sensitivity, s.patient.carb_ratio, s.target.low, s.target.high
    );
    let _ = write!(
        out,
        "Insulin {:?} over {:.0} min",
        s.insulin.model, s.insulin.action_duration_min
    );
    match s.insulin.model.peak_activity_min() {
        Some(peak) => {
            let _ = writeln!(out, " (peak {peak:.0} min)");
        }
        None => {
            let _ = writeln!(out);
        }
    }
    let _ = writeln!(
        out,
        "Limits: bolus {:.2} U  basal {:.2} U/h  IOB {:.2} U",
        s.limits.max_bolus, s.limits.max_basal_rate, s.limits.max_iob
    );
    Ok(out)
}
