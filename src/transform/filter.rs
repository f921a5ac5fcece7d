//! # Filter Graph Construction
//!
//! Builds the audio filter chain handed to the engine as typed steps instead of
//! an interpolated string. Every numeric parameter is rendered with a fixed
//! precision, so the same request always yields the same `-af` argument.
//!
//! ## Pitch shift by rate reinterpretation
//! For a shift of `n` semitones the playback rate is `2^(n/12)`:
//! 1. `aresample=R` brings the input to the reference rate `R`
//! 2. `asetrate=R*rate` relabels the samples, which raises or lowers the pitch
//!    (and changes the duration as a side effect)
//! 3. `aresample=R` converts back to the reference rate
//! 4. `atempo=1/rate` stretches the duration back toward the original

use crate::config::{EngineConfig, PitchFilter};
use std::fmt;

/// Lowest and highest factor a single `atempo` instance accepts.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// What the client asked the pipeline to do with the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRequest {
    /// Transpose by a number of semitones (never zero once past intake)
    PitchShift { semitones: i32 },

    /// Re-encode at the reference sample rate without touching the pitch
    Resample,
}

impl TransformRequest {
    pub fn label(&self) -> String {
        match self {
            TransformRequest::PitchShift { semitones } => format!("pitch {:+}", semitones),
            TransformRequest::Resample => "resample".to_string(),
        }
    }
}

/// Playback-rate multiplier for a semitone shift in 12-tone equal temperament.
pub fn pitch_rate(semitones: i32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

/// One filter in the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterStep {
    Aresample { sample_rate: u32 },
    Asetrate { sample_rate: u32 },
    Atempo { factor: f64 },
    Rubberband { pitch: f64 },
}

impl fmt::Display for FilterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStep::Aresample { sample_rate } => write!(f, "aresample={}", sample_rate),
            FilterStep::Asetrate { sample_rate } => write!(f, "asetrate={}", sample_rate),
            FilterStep::Atempo { factor } => write!(f, "atempo={:.6}", factor),
            FilterStep::Rubberband { pitch } => write!(f, "rubberband=pitch={:.6}", pitch),
        }
    }
}

/// The knobs from `[engine]` that shape the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    pub reference_sample_rate: u32,
    pub pitch_filter: PitchFilter,
    pub preserve_duration: bool,
}

impl From<&EngineConfig> for GraphOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            reference_sample_rate: config.reference_sample_rate,
            pitch_filter: config.pitch_filter,
            preserve_duration: config.preserve_duration,
        }
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            reference_sample_rate: 48_000,
            pitch_filter: PitchFilter::ResampleTempo,
            preserve_duration: true,
        }
    }
}

/// An ordered filter chain, rendered as a comma-separated `-af` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    steps: Vec<FilterStep>,
}

impl FilterGraph {
    /// Build the chain for a request. Deterministic for a given request and options.
    pub fn for_request(request: TransformRequest, options: &GraphOptions) -> Self {
        let reference = options.reference_sample_rate;

        let steps = match request {
            TransformRequest::Resample => vec![FilterStep::Aresample { sample_rate: reference }],
            TransformRequest::PitchShift { semitones } => match options.pitch_filter {
                PitchFilter::Rubberband => vec![FilterStep::Rubberband {
                    pitch: pitch_rate(semitones),
                }],
                PitchFilter::ResampleTempo => {
                    // asetrate only takes whole rates, so compensate for the rate actually applied
                    let shifted = (reference as f64 * pitch_rate(semitones)).round() as u32;
                    let applied = shifted as f64 / reference as f64;

                    let mut steps = vec![
                        FilterStep::Aresample { sample_rate: reference },
                        FilterStep::Asetrate { sample_rate: shifted },
                        FilterStep::Aresample { sample_rate: reference },
                    ];
                    if options.preserve_duration {
                        steps.extend(
                            tempo_chain(1.0 / applied)
                                .into_iter()
                                .map(|factor| FilterStep::Atempo { factor }),
                        );
                    }
                    steps
                }
            },
        };

        Self { steps }
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Split a tempo factor into `atempo`-sized pieces whose product is the factor.
fn tempo_chain(mut factor: f64) -> Vec<f64> {
    let mut chain = Vec::new();
    while factor > ATEMPO_MAX {
        chain.push(ATEMPO_MAX);
        factor /= ATEMPO_MAX;
    }
    while factor < ATEMPO_MIN {
        chain.push(ATEMPO_MIN);
        factor /= ATEMPO_MIN;
    }
    chain.push(factor);
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_rate_formula() {
        assert!((pitch_rate(12) - 2.0).abs() < 1e-12);
        assert!((pitch_rate(-12) - 0.5).abs() < 1e-12);
        assert!((pitch_rate(1) - 1.059463).abs() < 1e-6);
        assert!((pitch_rate(0) - 1.0).abs() < 1e-12);

        for semitones in -4..=4 {
            let expected = 2f64.powf(semitones as f64 / 12.0);
            assert!((pitch_rate(semitones) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pitch_graph_resample_tempo() {
        let graph = FilterGraph::for_request(
            TransformRequest::PitchShift { semitones: 1 },
            &GraphOptions::default(),
        );

        // 48000 * 1.0594630943 = 50854.23, rounded to 50854; 48000 / 50854 = 0.943879
        assert_eq!(
            graph.to_string(),
            "aresample=48000,asetrate=50854,aresample=48000,atempo=0.943879"
        );
        assert_eq!(graph.steps().len(), 4);
    }

    #[test]
    fn test_pitch_graph_without_duration_compensation() {
        let options = GraphOptions {
            preserve_duration: false,
            ..GraphOptions::default()
        };
        let graph = FilterGraph::for_request(TransformRequest::PitchShift { semitones: -4 }, &options);

        assert!(graph.steps().iter().all(|s| !matches!(s, FilterStep::Atempo { .. })));
        assert_eq!(graph.steps()[1], FilterStep::Asetrate { sample_rate: 38098 });
    }

    #[test]
    fn test_rubberband_graph() {
        let options = GraphOptions {
            pitch_filter: PitchFilter::Rubberband,
            ..GraphOptions::default()
        };
        let graph = FilterGraph::for_request(TransformRequest::PitchShift { semitones: 12 }, &options);
        assert_eq!(graph.to_string(), "rubberband=pitch=2.000000");
    }

    #[test]
    fn test_resample_graph_ignores_pitch_options() {
        let options = GraphOptions {
            reference_sample_rate: 44_100,
            pitch_filter: PitchFilter::Rubberband,
            preserve_duration: true,
        };
        let graph = FilterGraph::for_request(TransformRequest::Resample, &options);
        assert_eq!(graph.to_string(), "aresample=44100");
    }

    #[test]
    fn test_tempo_chain_stays_in_range() {
        assert_eq!(tempo_chain(1.25), vec![1.25]);

        let chain = tempo_chain(5.0);
        assert!(chain.iter().all(|f| (ATEMPO_MIN..=ATEMPO_MAX).contains(f)));
        assert!((chain.iter().product::<f64>() - 5.0).abs() < 1e-9);

        let chain = tempo_chain(0.1);
        assert!(chain.iter().all(|f| (ATEMPO_MIN..=ATEMPO_MAX).contains(f)));
        assert!((chain.iter().product::<f64>() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_request_labels() {
        assert_eq!(TransformRequest::PitchShift { semitones: 3 }.label(), "pitch +3");
        assert_eq!(TransformRequest::PitchShift { semitones: -2 }.label(), "pitch -2");
        assert_eq!(TransformRequest::Resample.label(), "resample");
    }
}
