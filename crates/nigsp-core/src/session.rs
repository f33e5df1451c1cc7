// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Session Stages
// ─────────────────────────────────────────────────────────────────────
//! One analysis run as a chain of immutable stages.
//!
//! ```text
//! ScGraph ──build_laplacian──▶ StructuralGraph ──decompose──▶ DecomposedGraph
//!    ──split──▶ SplitGraph ──analyse──▶ AnalysedGraph ──test──▶ TestedGraph
//! ```
//!
//! Each transition consumes the previous stage and returns a new value.
//! Nothing is mutated after construction; every stage only exposes
//! read-only accessors.

use nigsp_graph::graph::{node_strength, zero_crossings};
use nigsp_graph::laplacian::{build_laplacian, Laplacian, LaplacianOptions};
use nigsp_graph::spectral::{decompose, EigenDecomposition};
use nigsp_signal::filter::{split, BandSignal};
use nigsp_signal::fourier::{forward, resolve_split, spectral_energy, BandSplit};
use nigsp_signal::metrics::{
    gsdi, gsdi_pairs, sdi, sdi_per_subject, GsdiPair, SdiOptions, MAX_PAIR_BANDS,
};
use nigsp_signal::timeseries::{functional_connectivity, normalise_timeseries};
use nigsp_surrogates::{
    group_bernoulli_test, GroupTestResult, NullDistribution, SignificanceOptions,
    SignificanceResult, SurrogateEngine,
};
use nigsp_types::{
    BandSpec, FcAggregation, Matrix, NigspError, NigspResult, SignConvention, Signal,
    TestMethod,
};
use serde::Serialize;

// ── Stage 0: inputs ───────────────────────────────────────────────────

/// Validated connectivity matrix and signal of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScGraph {
    connectivity: Matrix,
    signal: Signal,
}

impl ScGraph {
    /// Fails on a non-square or non-finite connectivity matrix, a
    /// non-finite signal, or a node count disagreement.
    pub fn new(connectivity: Matrix, signal: Signal) -> NigspResult<Self> {
        let n = connectivity.ensure_square()?;
        connectivity.ensure_finite("connectivity")?;
        signal.ensure_finite("signal")?;
        if signal.n_nodes() != n {
            return Err(NigspError::shape(
                "signal nodes vs connectivity",
                n,
                signal.n_nodes(),
            ));
        }
        log::info!(
            "session: {} nodes, {} timepoints, {} subject(s)",
            n,
            signal.n_timepoints(),
            signal.n_subjects()
        );
        Ok(Self {
            connectivity,
            signal,
        })
    }

    /// Typed conversion from nested vectors: `connectivity[row][col]` and
    /// `signal[node][time][subject]`.
    pub fn from_nested(
        connectivity: Vec<Vec<f64>>,
        signal: Vec<Vec<Vec<f64>>>,
    ) -> NigspResult<Self> {
        Self::new(Matrix::from_rows(connectivity)?, Signal::from_nested(signal)?)
    }

    pub fn connectivity(&self) -> &Matrix {
        &self.connectivity
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn n_nodes(&self) -> usize {
        self.connectivity.rows()
    }

    /// Same graph with every node series z-scored over time.
    pub fn zscored(self) -> NigspResult<Self> {
        let signal = normalise_timeseries(&self.signal)?;
        Ok(Self {
            connectivity: self.connectivity,
            signal,
        })
    }

    pub fn build_laplacian(self, opts: &LaplacianOptions) -> NigspResult<StructuralGraph> {
        let laplacian = build_laplacian(&self.connectivity, opts)?;
        Ok(StructuralGraph {
            graph: self,
            laplacian,
        })
    }
}

// ── Stage 1: Laplacian ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralGraph {
    graph: ScGraph,
    laplacian: Laplacian,
}

impl StructuralGraph {
    pub fn graph(&self) -> &ScGraph {
        &self.graph
    }

    pub fn laplacian(&self) -> &Laplacian {
        &self.laplacian
    }

    /// Eigendecomposition plus the graph Fourier coefficients of the signal.
    pub fn decompose(self, sign: SignConvention) -> NigspResult<DecomposedGraph> {
        let eigen = decompose(self.laplacian.matrix(), sign)?;
        log::debug!(
            "decomposed: lambda range [{:.4}, {:.4}]",
            eigen.eigenvalues().first().copied().unwrap_or(0.0),
            eigen.eigenvalues().last().copied().unwrap_or(0.0)
        );
        let coefficients = forward(self.graph.signal(), eigen.eigenvectors())?;
        Ok(DecomposedGraph {
            structural: self,
            eigen,
            coefficients,
        })
    }
}

// ── Stage 2: spectrum ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecomposedGraph {
    structural: StructuralGraph,
    eigen: EigenDecomposition,
    coefficients: Signal,
}

impl DecomposedGraph {
    pub fn structural(&self) -> &StructuralGraph {
        &self.structural
    }

    pub fn eigen(&self) -> &EigenDecomposition {
        &self.eigen
    }

    /// Graph Fourier coefficients, signal-shaped.
    pub fn coefficients(&self) -> &Signal {
        &self.coefficients
    }

    pub fn spectral_energy(&self) -> Vec<f64> {
        spectral_energy(&self.coefficients)
    }

    /// Resolve `spec` against the coefficients and filter every band.
    pub fn split(self, spec: &BandSpec) -> NigspResult<SplitGraph> {
        let band_split = resolve_split(spec, &self.coefficients)?;
        self.split_with(band_split)
    }

    pub fn split_with(self, band_split: BandSplit) -> NigspResult<SplitGraph> {
        let bands = split(&self.coefficients, self.eigen.eigenvectors(), &band_split)?;
        log::info!("split spectrum at {:?}", band_split.cutoffs());
        Ok(SplitGraph {
            decomposed: self,
            band_split,
            bands,
        })
    }
}

// ── Stage 3: bands ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitGraph {
    decomposed: DecomposedGraph,
    band_split: BandSplit,
    bands: Vec<BandSignal>,
}

/// Metric options used by [`SplitGraph::analyse`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisOptions {
    pub sdi: SdiOptions,
    pub fc_aggregation: FcAggregation,
    /// Reference band of gSDI.
    pub gsdi_reference: usize,
}

impl SplitGraph {
    pub fn decomposed(&self) -> &DecomposedGraph {
        &self.decomposed
    }

    pub fn band_split(&self) -> &BandSplit {
        &self.band_split
    }

    pub fn bands(&self) -> &[BandSignal] {
        &self.bands
    }

    pub fn analyse(self, opts: &AnalysisOptions) -> NigspResult<AnalysedGraph> {
        let structural = self.decomposed.structural();
        let connectivity = structural.graph().connectivity();
        let signal = structural.graph().signal();

        let (sdi_values, sdi_subjects) = if self.bands.len() == 2 {
            let (low, high) = (self.bands[0].signal(), self.bands[1].signal());
            (
                Some(sdi(low, high, opts.sdi)?),
                Some(sdi_per_subject(low, high, opts.sdi)?),
            )
        } else {
            (None, None)
        };
        let pairs = if self.bands.len() <= MAX_PAIR_BANDS {
            gsdi_pairs(&self.bands, opts.sdi)?
        } else {
            log::warn!(
                "{} bands exceed {MAX_PAIR_BANDS}, skipping combined-band gSDI",
                self.bands.len()
            );
            Vec::new()
        };

        let metrics = GraphMetrics {
            node_strength: node_strength(connectivity)?,
            functional_connectivity: functional_connectivity(signal, opts.fc_aggregation)?,
            zero_crossings: zero_crossings(
                self.decomposed.eigen().eigenvectors(),
                structural.laplacian().adjacency(),
            )?,
            sdi: sdi_values,
            sdi_per_subject: sdi_subjects,
            gsdi: gsdi(&self.bands, opts.gsdi_reference, opts.sdi)?,
            gsdi_pairs: pairs,
        };
        log::info!("computed metrics for {} bands", self.bands.len());

        Ok(AnalysedGraph {
            split: self,
            options: *opts,
            metrics,
        })
    }
}

// ── Stage 4: metrics ──────────────────────────────────────────────────

/// Read-only metric outputs of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphMetrics {
    /// Row sums of |W|.
    pub node_strength: Vec<f64>,
    /// N × N.
    pub functional_connectivity: Matrix,
    /// Sign changes across edges, per eigenvector.
    pub zero_crossings: Vec<usize>,
    /// Two-band SDI, pooled over subjects.
    pub sdi: Option<Vec<f64>>,
    /// Two-band SDI, N × S.
    pub sdi_per_subject: Option<Matrix>,
    /// N × (B − 1).
    pub gsdi: Matrix,
    /// Every band over every other band or band combination.
    pub gsdi_pairs: Vec<GsdiPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysedGraph {
    split: SplitGraph,
    #[serde(skip)]
    options: AnalysisOptions,
    metrics: GraphMetrics,
}

/// SDI for two bands, otherwise gSDI flattened row-major.
fn decoupling(
    signal: &Signal,
    eigenvectors: &Matrix,
    band_split: &BandSplit,
    opts: &AnalysisOptions,
) -> NigspResult<Vec<f64>> {
    let coefficients = forward(signal, eigenvectors)?;
    let bands = split(&coefficients, eigenvectors, band_split)?;
    if bands.len() == 2 {
        sdi(bands[0].signal(), bands[1].signal(), opts.sdi)
    } else {
        Ok(gsdi(&bands, opts.gsdi_reference, opts.sdi)?.into_vec())
    }
}

/// [`decoupling`] of each subject on its own: M × S.
fn subject_decoupling(
    signal: &Signal,
    eigenvectors: &Matrix,
    band_split: &BandSplit,
    opts: &AnalysisOptions,
) -> NigspResult<Matrix> {
    let columns = (0..signal.n_subjects())
        .map(|s| {
            let single = Signal::from_matrix(signal.subject_matrix(s))?;
            decoupling(&single, eigenvectors, band_split, opts)
        })
        .collect::<NigspResult<Vec<Vec<f64>>>>()?;
    let m_len = columns.first().map_or(0, Vec::len);
    let mut out = Matrix::zeros(m_len, columns.len());
    for (s, column) in columns.iter().enumerate() {
        for (m, &v) in column.iter().enumerate() {
            out[(m, s)] = v;
        }
    }
    Ok(out)
}

impl AnalysedGraph {
    pub fn split(&self) -> &SplitGraph {
        &self.split
    }

    pub fn metrics(&self) -> &GraphMetrics {
        &self.metrics
    }

    pub fn signal(&self) -> &Signal {
        self.split.decomposed().structural().graph().signal()
    }

    pub fn laplacian(&self) -> &Laplacian {
        self.split.decomposed().structural().laplacian()
    }

    pub fn eigen(&self) -> &EigenDecomposition {
        self.split.decomposed().eigen()
    }

    /// The metric tested against surrogates: SDI for two bands, gSDI
    /// flattened row-major otherwise.
    pub fn observed(&self) -> Vec<f64> {
        match &self.metrics.sdi {
            Some(values) => values.clone(),
            None => self.metrics.gsdi.as_slice().to_vec(),
        }
    }

    /// The tested metric for each subject separately: M × S.
    pub fn observed_per_subject(&self) -> NigspResult<Matrix> {
        match &self.metrics.sdi_per_subject {
            Some(values) => Ok(values.clone()),
            None => subject_decoupling(
                self.signal(),
                self.eigen().eigenvectors(),
                self.split.band_split(),
                &self.options,
            ),
        }
    }

    /// Generate surrogates, build the null distribution of the observed
    /// metric and test it. With several subjects the metric is also taken
    /// per subject: `TestMethod::Binomial` tests those subject trials, and
    /// the group Bernoulli test runs at the same threshold.
    pub fn test(
        self,
        engine: &SurrogateEngine,
        opts: SignificanceOptions,
    ) -> NigspResult<TestedGraph> {
        let signal = self.signal();
        let eigen = self.eigen();
        let band_split = self.split.band_split();
        let set = engine.generate(signal, self.laplacian(), eigen)?;

        let null = set.null_distribution(|x: &Signal| {
            decoupling(x, eigen.eigenvectors(), band_split, &self.options)
        })?;

        let (significance, group) = if signal.n_subjects() > 1 {
            let observed = self.observed_per_subject()?;
            let per_subject = set.null_distribution(|x: &Signal| {
                Ok(subject_decoupling(x, eigen.eigenvectors(), band_split, &self.options)?
                    .into_vec())
            })?;
            let significance = match opts.method() {
                TestMethod::Binomial => per_subject.test_subjects(&observed, opts)?,
                TestMethod::Empirical => null.test(&self.observed(), opts)?,
            };
            let null_matrices = per_subject.to_matrices(observed.rows(), observed.cols())?;
            let group = group_bernoulli_test(
                &observed,
                &null_matrices,
                opts.threshold(),
                opts.threshold(),
            )?;
            (significance, Some(group))
        } else {
            (null.test(&self.observed(), opts)?, None)
        };

        log::info!(
            "{} of {} entries significant at p < {}",
            significance.n_significant(),
            significance.p_values.len(),
            opts.threshold()
        );

        Ok(TestedGraph {
            analysed: self,
            null,
            significance,
            group,
        })
    }
}

// ── Stage 5: significance ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestedGraph {
    analysed: AnalysedGraph,
    null: NullDistribution,
    significance: SignificanceResult,
    group: Option<GroupTestResult>,
}

impl TestedGraph {
    pub fn analysed(&self) -> &AnalysedGraph {
        &self.analysed
    }

    pub fn metrics(&self) -> &GraphMetrics {
        self.analysed.metrics()
    }

    pub fn null(&self) -> &NullDistribution {
        &self.null
    }

    pub fn significance(&self) -> &SignificanceResult {
        &self.significance
    }

    pub fn group(&self) -> Option<&GroupTestResult> {
        self.group.as_ref()
    }
}
