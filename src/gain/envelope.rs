use crate::error::ProcessError;

/// Gain mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Duck by a fixed number of dB.
    FixedDb,
    /// Duck so the intro lands at a target integrated loudness.
    TargetLufs,
}

/// Piecewise-linear gain curve in dB over time.
///
/// Breakpoint times are strictly increasing; outside the first and last
/// breakpoints the gain holds the endpoint value.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    breakpoints: Vec<(f64, f64)>,
}

impl Envelope {
    pub fn breakpoints(&self) -> &[(f64, f64)] {
        &self.breakpoints
    }

    /// Envelope value in dB at time `t`.
    pub fn gain_db_at(&self, t: f64) -> f64 {
        let bps = &self.breakpoints;
        if t <= bps[0].0 {
            return bps[0].1;
        }
        if t >= bps[bps.len() - 1].0 {
            return bps[bps.len() - 1].1;
        }
        for pair in bps.windows(2) {
            let (t0, g0) = pair[0];
            let (t1, g1) = pair[1];
            if t <= t1 {
                return g0 + (t - t0) * (g1 - g0) / (t1 - t0);
            }
        }
        bps[bps.len() - 1].1
    }

    /// The deepest gain in the envelope (the duck plateau).
    pub fn plateau_db(&self) -> f64 {
        self.breakpoints
            .iter()
            .map(|&(_, g)| g)
            .fold(0.0, f64::min)
    }
}

/// Everything the planner needs for one episode.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput {
    pub intro_start: f64,
    pub intro_end: f64,
    pub episode_duration: f64,
    /// Measured intro loudness; `None` when the interval was too short to
    /// gate, which forces the fixed-dB fallback.
    pub intro_lufs: Option<f64>,
    pub mode: GainMode,
    pub fade_seconds: f64,
    pub duck_db: f64,
    pub target_lufs: Option<f64>,
}

/// Minimum fade to keep the gain ramp inaudible as a click.
pub const MIN_FADE_SECONDS: f64 = 0.02;

const PLATEAU_MIN_DB: f64 = -24.0;
const PLATEAU_MAX_DB: f64 = 0.0;

/// Plan the duck envelope for a detected or manual intro interval.
pub fn plan(input: &PlanInput) -> Result<Envelope, ProcessError> {
    if input.fade_seconds < MIN_FADE_SECONDS {
        return Err(ProcessError::InvalidInterval(format!(
            "fade {:.3}s is below the {MIN_FADE_SECONDS}s minimum",
            input.fade_seconds
        )));
    }
    if input.intro_start < 0.0 {
        return Err(ProcessError::InvalidInterval(format!(
            "intro start {:.2}s is negative",
            input.intro_start
        )));
    }
    if input.intro_end <= input.intro_start {
        return Err(ProcessError::InvalidInterval(format!(
            "intro interval {:.2}..{:.2}s is not ordered",
            input.intro_start, input.intro_end
        )));
    }
    if input.intro_end > input.episode_duration + 1e-6 {
        return Err(ProcessError::InvalidInterval(format!(
            "intro ends at {:.2}s but the episode is {:.2}s",
            input.intro_end, input.episode_duration
        )));
    }
    if input.duck_db > 0.0 {
        return Err(ProcessError::InvalidInterval(format!(
            "duck of {:+.1} dB would amplify the intro",
            input.duck_db
        )));
    }

    let plateau = match (input.mode, input.target_lufs, input.intro_lufs) {
        (GainMode::TargetLufs, Some(target), Some(measured)) => {
            (target - measured).clamp(PLATEAU_MIN_DB, PLATEAU_MAX_DB)
        }
        // Unmeasurable intro: fall back to the fixed duck.
        _ => input.duck_db,
    };

    let start = input.intro_start;
    let end = input.intro_end;
    let fade = input.fade_seconds;

    let mut breakpoints = vec![(0.0, 0.0), (start, 0.0)];
    if 2.0 * fade >= end - start {
        // Fades overlap: collapse the plateau to the interval midpoint.
        breakpoints.push(((start + end) / 2.0, plateau));
    } else {
        breakpoints.push((start + fade, plateau));
        breakpoints.push((end - fade, plateau));
    }
    breakpoints.push((end, 0.0));

    // An intro flush against either file edge collapses duplicate times.
    breakpoints.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-9);

    Ok(Envelope { breakpoints })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(start: f64, end: f64, duck: f64, fade: f64, duration: f64) -> PlanInput {
        PlanInput {
            intro_start: start,
            intro_end: end,
            episode_duration: duration,
            intro_lufs: None,
            mode: GainMode::FixedDb,
            fade_seconds: fade,
            duck_db: duck,
            target_lufs: None,
        }
    }

    #[test]
    fn five_breakpoint_shape() {
        let env = plan(&fixed(10.0, 40.0, -12.0, 0.5, 1200.0)).unwrap();
        assert_eq!(
            env.breakpoints(),
            &[
                (0.0, 0.0),
                (10.0, 0.0),
                (10.5, -12.0),
                (39.5, -12.0),
                (40.0, 0.0)
            ]
        );
    }

    #[test]
    fn overlapping_fades_collapse_to_midpoint() {
        let env = plan(&fixed(10.0, 12.0, -9.0, 1.5, 1200.0)).unwrap();
        assert_eq!(
            env.breakpoints(),
            &[(0.0, 0.0), (10.0, 0.0), (11.0, -9.0), (12.0, 0.0)]
        );
    }

    #[test]
    fn intro_at_file_start_drops_duplicate_breakpoint() {
        let env = plan(&fixed(0.0, 30.0, -9.0, 0.5, 1200.0)).unwrap();
        assert_eq!(env.breakpoints()[0], (0.0, 0.0));
        assert_eq!(env.breakpoints()[1], (0.5, -9.0));
        let times: Vec<f64> = env.breakpoints().iter().map(|b| b.0).collect();
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn target_mode_clamps_the_plateau() {
        // Intro at -14 LUFS, target -24: plateau -10.
        let mut input = fixed(10.0, 40.0, -9.0, 0.5, 1200.0);
        input.mode = GainMode::TargetLufs;
        input.target_lufs = Some(-24.0);
        input.intro_lufs = Some(-14.0);
        assert_eq!(plan(&input).unwrap().plateau_db(), -10.0);

        // A very loud intro clamps at -24.
        input.intro_lufs = Some(10.0);
        assert_eq!(plan(&input).unwrap().plateau_db(), -24.0);

        // An already-quiet intro clamps at 0 (never boosts).
        input.intro_lufs = Some(-40.0);
        assert_eq!(plan(&input).unwrap().plateau_db(), 0.0);
    }

    #[test]
    fn unmeasurable_intro_falls_back_to_fixed_plan() {
        let fixed_plan = plan(&fixed(10.0, 40.0, -9.0, 0.5, 1200.0)).unwrap();

        let mut input = fixed(10.0, 40.0, -9.0, 0.5, 1200.0);
        input.mode = GainMode::TargetLufs;
        input.target_lufs = Some(-24.0);
        input.intro_lufs = None;
        assert_eq!(plan(&input).unwrap(), fixed_plan);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(matches!(
            plan(&fixed(10.0, 40.0, -9.0, 0.01, 1200.0)),
            Err(ProcessError::InvalidInterval(_))
        ));
        assert!(matches!(
            plan(&fixed(-1.0, 40.0, -9.0, 0.5, 1200.0)),
            Err(ProcessError::InvalidInterval(_))
        ));
        assert!(matches!(
            plan(&fixed(50.0, 40.0, -9.0, 0.5, 1200.0)),
            Err(ProcessError::InvalidInterval(_))
        ));
        assert!(matches!(
            plan(&fixed(10.0, 1300.0, -9.0, 0.5, 1200.0)),
            Err(ProcessError::InvalidInterval(_))
        ));
        // Positive duck would amplify; rejected until explicitly supported.
        assert!(matches!(
            plan(&fixed(10.0, 40.0, 3.0, 0.5, 1200.0)),
            Err(ProcessError::InvalidInterval(_))
        ));
    }

    #[test]
    fn envelope_is_continuous_with_zero_endpoints() {
        let env = plan(&fixed(18.0, 68.0, -10.0, 0.12, 1325.0)).unwrap();

        assert_eq!(env.gain_db_at(0.0), 0.0);
        assert_eq!(env.gain_db_at(1325.0), 0.0);

        // Left and right limits agree at every breakpoint.
        for &(t, g) in env.breakpoints() {
            let eps = 1e-7;
            assert!((env.gain_db_at(t - eps) - g).abs() < 1e-4);
            assert!((env.gain_db_at(t + eps) - g).abs() < 1e-4);
        }

        // Mid-fade values interpolate.
        let mid_fade = env.gain_db_at(18.06);
        assert!((mid_fade - -5.0).abs() < 1e-9, "got {mid_fade}");
    }
}
