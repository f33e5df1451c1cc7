// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Pipeline
// ─────────────────────────────────────────────────────────────────────
//! Config-driven orchestration of the session stages.

use nigsp_graph::laplacian::LaplacianOptions;
use nigsp_signal::metrics::SdiOptions;
use nigsp_surrogates::{SignificanceOptions, SurrogateEngine};
use nigsp_types::{Matrix, NigspConfig, NigspResult, Signal};

use crate::session::{AnalysedGraph, AnalysisOptions, ScGraph, TestedGraph};

/// Runs connectivity + signal through every stage under one validated
/// [`NigspConfig`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: NigspConfig,
}

impl Pipeline {
    pub fn new(config: NigspConfig) -> NigspResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_json(json: &str) -> NigspResult<Self> {
        Self::new(NigspConfig::from_json(json)?)
    }

    pub fn config(&self) -> &NigspConfig {
        &self.config
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            sdi: SdiOptions::new(self.config.sdi_measure).with_pooling(self.config.sdi_pooling),
            fc_aggregation: self.config.fc_aggregation,
            gsdi_reference: 0,
        }
    }

    /// Laplacian → decomposition → band split → metrics.
    pub fn analyse(&self, connectivity: Matrix, signal: Signal) -> NigspResult<AnalysedGraph> {
        let mut graph = ScGraph::new(connectivity, signal)?;
        if self.config.zscore {
            graph = graph.zscored()?;
        }
        graph
            .build_laplacian(&LaplacianOptions::from_config(&self.config))?
            .decompose(self.config.sign_convention)?
            .split(&self.config.bands)?
            .analyse(&self.analysis_options())
    }

    /// [`Pipeline::analyse`] followed by surrogate significance testing.
    pub fn run(&self, connectivity: Matrix, signal: Signal) -> NigspResult<TestedGraph> {
        let analysed = self.analyse(connectivity, signal)?;
        let engine = SurrogateEngine::from_config(&self.config)?;
        let opts = SignificanceOptions::from_config(&self.config)?;
        analysed.test(&engine, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nigsp_types::{
        BandSpec, NigspError, Normalisation, SdiPooling, SurrogateKind, TestMethod,
    };

    fn modules(n: usize) -> Matrix {
        // two dense modules joined by one weak edge
        let half = n / 2;
        let mut w = Matrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                if (i < half) == (j < half) {
                    w[(i, j)] = 1.0;
                    w[(j, i)] = 1.0;
                }
            }
        }
        w[(half - 1, half)] = 0.1;
        w[(half, half - 1)] = 0.1;
        w
    }

    fn signal(n: usize, t: usize, s: usize) -> Signal {
        let data = (0..n * t * s)
            .map(|i| ((i * 31 % 97) as f64 * 0.13).sin())
            .collect();
        Signal::from_vec(n, t, s, data).unwrap()
    }

    fn small_config() -> NigspConfig {
        NigspConfig {
            n_surrogates: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = NigspConfig {
            p_threshold: 2.0,
            ..Default::default()
        };
        assert!(matches!(Pipeline::new(cfg).unwrap_err(), NigspError::Config(_)));
    }

    #[test]
    fn test_from_json() {
        let p = Pipeline::from_json(
            r#"{"normalisation": "none", "n_surrogates": 20, "surrogate_kind": "structure_informed"}"#,
        )
        .unwrap();
        assert_eq!(p.config().normalisation, Normalisation::None);
        assert_eq!(p.config().surrogate_kind, SurrogateKind::StructureInformed);
    }

    #[test]
    fn test_end_to_end() {
        let n = 10;
        let out = Pipeline::new(small_config())
            .unwrap()
            .run(modules(n), signal(n, 30, 1))
            .unwrap();
        let sig = out.significance();
        assert_eq!(sig.p_values.len(), n);
        assert!(sig.p_values.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(out.null().n_samples(), 50);
        assert!(out.group().is_none());
        let eig = out.analysed().eigen();
        assert!(eig.is_ascending());
        assert!(eig.eigenvalues()[0].abs() < 1e-9);
    }

    #[test]
    fn test_every_surrogate_kind_runs() {
        let n = 8;
        for kind in [
            SurrogateKind::RandomSign,
            SurrogateKind::StructureUninformed,
            SurrogateKind::StructureInformed,
            SurrogateKind::ConfigurationModel,
        ] {
            let cfg = NigspConfig {
                n_surrogates: 20,
                surrogate_kind: kind,
                degree_bins: 2,
                ..Default::default()
            };
            let out = Pipeline::new(cfg).unwrap().run(modules(n), signal(n, 12, 2));
            assert!(out.is_ok(), "{kind:?}: {:?}", out.err());
        }
    }

    #[test]
    fn test_same_config_same_result() {
        let n = 8;
        let p = Pipeline::new(small_config()).unwrap();
        let a = p.run(modules(n), signal(n, 16, 2)).unwrap();
        let b = p.run(modules(n), signal(n, 16, 2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_explicit_bands_out_of_range() {
        let cfg = NigspConfig {
            bands: BandSpec::Explicit(vec![3, 12]),
            ..small_config()
        };
        let err = Pipeline::new(cfg)
            .unwrap()
            .analyse(modules(8), signal(8, 10, 1))
            .unwrap_err();
        assert!(matches!(err, NigspError::InvalidBandSpecification(_)));
    }

    #[test]
    fn test_isolated_node_policy() {
        let mut w = modules(6);
        for j in 0..6 {
            w[(0, j)] = 0.0;
            w[(j, 0)] = 0.0;
        }
        let strict = NigspConfig {
            allow_isolated: false,
            ..small_config()
        };
        let err = Pipeline::new(strict)
            .unwrap()
            .analyse(w.clone(), signal(6, 10, 1))
            .unwrap_err();
        assert!(matches!(err, NigspError::DegenerateDegree { node: 0 }));
        assert!(Pipeline::new(small_config())
            .unwrap()
            .analyse(w, signal(6, 10, 1))
            .is_ok());
    }

    #[test]
    fn test_random_walk_normalisation_rejected() {
        for normalisation in [Normalisation::RandomWalkIn, Normalisation::RandomWalkOut] {
            let cfg = NigspConfig {
                normalisation,
                ..small_config()
            };
            assert!(matches!(Pipeline::new(cfg).unwrap_err(), NigspError::Config(_)));
        }
        let err = Pipeline::from_json(r#"{"normalisation": "random_walk_out"}"#).unwrap_err();
        assert!(matches!(err, NigspError::Config(_)));
    }

    #[test]
    fn test_subject_mean_pooling_reaches_sdi() {
        let n = 8;
        let pooled = Pipeline::new(small_config()).unwrap();
        let mean = Pipeline::new(NigspConfig {
            sdi_pooling: SdiPooling::SubjectMean,
            ..small_config()
        })
        .unwrap();
        assert_eq!(mean.analysis_options().sdi.pooling, SdiPooling::SubjectMean);
        let a = pooled.analyse(modules(n), signal(n, 20, 3)).unwrap();
        let b = mean.analyse(modules(n), signal(n, 20, 3)).unwrap();
        // the per-subject values do not depend on pooling
        assert_eq!(a.metrics().sdi_per_subject, b.metrics().sdi_per_subject);
        assert_ne!(a.metrics().sdi, b.metrics().sdi);
    }

    #[test]
    fn test_binomial_config_end_to_end() {
        let n = 8;
        let cfg = NigspConfig {
            test_method: TestMethod::Binomial,
            n_surrogates: 40,
            ..Default::default()
        };
        let out = Pipeline::new(cfg).unwrap().run(modules(n), signal(n, 16, 4)).unwrap();
        assert_eq!(out.significance().method, TestMethod::Binomial);
        assert!(out.group().is_some());
    }
}
