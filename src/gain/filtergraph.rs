use super::envelope::Envelope;

/// Everything the external renderer needs: the audio filter realizing the
/// envelope, the episode duration, and the directive to copy every
/// non-audio stream untouched.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// Value for the renderer's audio-filter argument.
    pub audio_filter: String,
    pub duration_seconds: f64,
    /// Video and subtitle streams are passed through without re-encoding.
    pub copy_video: bool,
    pub copy_subtitles: bool,
}

/// Serialize the envelope into a time-keyed volume expression.
///
/// Each linear-in-dB segment becomes a clamped branch; evaluating the
/// expression at time `t` yields the amplitude multiplier
/// `10^(envelope(t)/20)`.
pub fn synthesize(envelope: &Envelope, duration_seconds: f64) -> RenderPlan {
    RenderPlan {
        audio_filter: format!("volume='{}':eval=frame", volume_expr(envelope)),
        duration_seconds,
        copy_video: true,
        copy_subtitles: true,
    }
}

fn volume_expr(envelope: &Envelope) -> String {
    let bps = envelope.breakpoints();
    let last = bps[bps.len() - 1];

    // Innermost term: gain held after the final breakpoint. Build the
    // branch chain outward from there, latest segment first.
    let mut expr = amplitude_literal(last.1);
    for pair in bps.windows(2).rev() {
        let (t0, g0) = pair[0];
        let (t1, g1) = pair[1];
        let segment = if (g1 - g0).abs() < 1e-12 {
            amplitude_literal(g0)
        } else {
            let slope = (g1 - g0) / (t1 - t0);
            format!(
                "pow(10,({}+(t-{})*{})/20)",
                number(g0),
                number(t0),
                number(slope)
            )
        };
        expr = format!("if(lt(t,{}),{},{})", number(t1), segment, expr);
    }

    // Gain held before the first breakpoint, when it is not at t=0.
    let (t_first, g_first) = bps[0];
    if t_first > 0.0 {
        expr = format!(
            "if(lt(t,{}),{},{})",
            number(t_first),
            amplitude_literal(g_first),
            expr
        );
    }
    expr
}

fn amplitude_literal(gain_db: f64) -> String {
    if gain_db == 0.0 {
        "1".into()
    } else {
        number(10.0f64.powf(gain_db / 20.0))
    }
}

/// Compact decimal form accepted by the renderer's expression parser.
fn number(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gain::envelope::{plan, GainMode, PlanInput};

    fn example_envelope() -> Envelope {
        plan(&PlanInput {
            intro_start: 10.0,
            intro_end: 40.0,
            episode_duration: 1200.0,
            intro_lufs: None,
            mode: GainMode::FixedDb,
            fade_seconds: 0.5,
            duck_db: -12.0,
            target_lufs: None,
        })
        .unwrap()
    }

    #[test]
    fn plan_carries_duration_and_copy_directives() {
        let plan = synthesize(&example_envelope(), 1200.0);
        assert_eq!(plan.duration_seconds, 1200.0);
        assert!(plan.copy_video);
        assert!(plan.copy_subtitles);
        assert!(plan.audio_filter.starts_with("volume='"));
        assert!(plan.audio_filter.ends_with("':eval=frame"));
    }

    #[test]
    fn expression_holds_unity_outside_the_intro() {
        let expr = volume_expr(&example_envelope());
        // Flat 0 dB head segment and trailing hold are plain unity.
        assert!(expr.starts_with("if(lt(t,10),1,"));
        assert!(expr.ends_with(",1))))"), "{expr}");
    }

    #[test]
    fn expression_contains_the_plateau_multiplier() {
        let expr = volume_expr(&example_envelope());
        // 10^(-12/20) = 0.251189
        assert!(expr.contains("0.251189"), "{expr}");
        // Fade segments are dB-linear ramps under pow().
        assert!(expr.contains("pow(10,(0+(t-10)*-24)/20)"), "{expr}");
        assert!(expr.contains("pow(10,(-12+(t-39.5)*24)/20)"), "{expr}");
    }

    #[test]
    fn collapsed_envelope_produces_a_single_ramp_pair() {
        let env = plan(&PlanInput {
            intro_start: 10.0,
            intro_end: 12.0,
            episode_duration: 100.0,
            intro_lufs: None,
            mode: GainMode::FixedDb,
            fade_seconds: 1.5,
            duck_db: -9.0,
            target_lufs: None,
        })
        .unwrap();
        let expr = volume_expr(&env);
        assert_eq!(expr.matches("pow(").count(), 2, "{expr}");
    }

    #[test]
    fn number_formatting_is_compact() {
        assert_eq!(number(10.0), "10");
        assert_eq!(number(39.5), "39.5");
        assert_eq!(number(-24.0), "-24");
        assert_eq!(number(0.251188643150958), "0.251189");
    }
}
