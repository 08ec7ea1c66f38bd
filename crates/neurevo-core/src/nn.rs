//! Genome-decoded brains: 24 inputs → 8 hidden (tanh) → 6 outputs (tanh).
//!
//! Weight layout is position-addressed, in this order:
//! input→hidden (`hidden × inputs`), [hidden→hidden (`hidden × hidden`), recurrent only],
//! hidden bias, hidden→output (`outputs × hidden`), output bias.
//! FeedForward: 192 + 8 + 48 + 6 = 254 weights. Recurrent: 254 + 64 = 318.

use crate::config::BrainKind;
use crate::genome::{brain_gene_name, Genome};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const BASE_INPUT_SIZE: usize = 24;
pub const HIDDEN_SIZE: usize = 8;
pub const OUTPUT_SIZE: usize = 6;

/// Added to synthesized recurrent self-connections so missing genes start near identity.
const RECURRENT_IDENTITY_BIAS: f64 = 0.5;
const HIDDEN_STATE_INIT_STDDEV: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrainError {
    #[error("{kind:?} brain with {input_size} inputs needs {expected} weights, got {actual}")]
    WeightCount {
        kind: BrainKind,
        input_size: usize,
        expected: usize,
        actual: usize,
    },
}

pub fn weight_count(kind: BrainKind, input_size: usize) -> usize {
    let base = input_size * HIDDEN_SIZE + HIDDEN_SIZE + OUTPUT_SIZE * HIDDEN_SIZE + OUTPUT_SIZE;
    match kind {
        BrainKind::Fnn => base,
        BrainKind::Rnn => base + HIDDEN_SIZE * HIDDEN_SIZE,
    }
}

fn check_len(kind: BrainKind, input_size: usize, weights: &[f64]) -> Result<(), BrainError> {
    let expected = weight_count(kind, input_size);
    if weights.len() < expected {
        return Err(BrainError::WeightCount {
            kind,
            input_size,
            expected,
            actual: weights.len(),
        });
    }
    Ok(())
}

/// Layers shared by both variants.
#[derive(Clone, Debug)]
struct Layers {
    input_size: usize,
    /// Hidden-major: `w_ih[h * input_size + i]`.
    w_ih: Vec<f64>,
    b_h: [f64; HIDDEN_SIZE],
    w_ho: [[f64; HIDDEN_SIZE]; OUTPUT_SIZE],
    b_o: [f64; OUTPUT_SIZE],
    last_hidden: [f64; HIDDEN_SIZE],
    last_outputs: [f64; OUTPUT_SIZE],
}

impl Layers {
    fn read_input_block(input_size: usize, next: &mut impl FnMut() -> f64) -> Vec<f64> {
        (0..input_size * HIDDEN_SIZE).map(|_| next()).collect()
    }

    fn read_tail(input_size: usize, w_ih: Vec<f64>, next: &mut impl FnMut() -> f64) -> Self {
        let mut b_h = [0.0; HIDDEN_SIZE];
        for b in &mut b_h {
            *b = next();
        }
        let mut w_ho = [[0.0; HIDDEN_SIZE]; OUTPUT_SIZE];
        for row in &mut w_ho {
            for w in row.iter_mut() {
                *w = next();
            }
        }
        let mut b_o = [0.0; OUTPUT_SIZE];
        for b in &mut b_o {
            *b = next();
        }
        Self {
            input_size,
            w_ih,
            b_h,
            w_ho,
            b_o,
            last_hidden: [0.0; HIDDEN_SIZE],
            last_outputs: [0.0; OUTPUT_SIZE],
        }
    }

    /// `b_h + w_ih · inputs`, with inputs zero-padded or truncated to `input_size`.
    fn hidden_pre_activation(&self, inputs: &[f64]) -> [f64; HIDDEN_SIZE] {
        let mut pre = self.b_h;
        for (h, acc) in pre.iter_mut().enumerate() {
            let row = &self.w_ih[h * self.input_size..(h + 1) * self.input_size];
            *acc += row
                .iter()
                .zip(inputs.iter().chain(std::iter::repeat(&0.0)))
                .map(|(w, x)| w * x)
                .sum::<f64>();
        }
        pre
    }

    fn finish(&mut self, hidden: [f64; HIDDEN_SIZE]) -> [f64; OUTPUT_SIZE] {
        let mut output = self.b_o;
        for (o, acc) in output.iter_mut().enumerate() {
            for (h, &value) in hidden.iter().enumerate() {
                *acc += self.w_ho[o][h] * value;
            }
            *acc = acc.tanh();
        }
        self.last_hidden = hidden;
        self.last_outputs = output;
        output
    }

    fn push_head(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.w_ih);
    }

    fn push_tail(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.b_h);
        for row in &self.w_ho {
            out.extend_from_slice(row);
        }
        out.extend_from_slice(&self.b_o);
    }
}

#[derive(Clone, Debug)]
pub struct FeedForward {
    layers: Layers,
}

impl FeedForward {
    /// Fails when `weights` is shorter than the architecture requires; extra weights are ignored.
    pub fn new(input_size: usize, weights: &[f64]) -> Result<Self, BrainError> {
        check_len(BrainKind::Fnn, input_size, weights)?;
        let mut iter = weights.iter().copied();
        let mut next = || iter.next().unwrap_or(0.0);
        let w_ih = Layers::read_input_block(input_size, &mut next);
        Ok(Self {
            layers: Layers::read_tail(input_size, w_ih, &mut next),
        })
    }

    fn run(&mut self, inputs: &[f64], noise: &mut dyn FnMut() -> f64) -> [f64; OUTPUT_SIZE] {
        let mut hidden = self.layers.hidden_pre_activation(inputs);
        for h in &mut hidden {
            *h = (*h + noise()).tanh();
        }
        self.layers.finish(hidden)
    }

    pub fn forward(&mut self, inputs: &[f64]) -> [f64; OUTPUT_SIZE] {
        self.run(inputs, &mut || 0.0)
    }
}

#[derive(Clone, Debug)]
pub struct Recurrent {
    layers: Layers,
    /// `w_hh[target][source]`.
    w_hh: [[f64; HIDDEN_SIZE]; HIDDEN_SIZE],
    hidden_state: [f64; HIDDEN_SIZE],
}

impl Recurrent {
    /// Hidden state starts as small Gaussian noise so tanh units are not saturated.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<Self, BrainError> {
        check_len(BrainKind::Rnn, input_size, weights)?;
        let mut iter = weights.iter().copied();
        let mut next = || iter.next().unwrap_or(0.0);
        let w_ih = Layers::read_input_block(input_size, &mut next);
        let mut w_hh = [[0.0; HIDDEN_SIZE]; HIDDEN_SIZE];
        for row in &mut w_hh {
            for w in row.iter_mut() {
                *w = next();
            }
        }
        let layers = Layers::read_tail(input_size, w_ih, &mut next);
        let mut hidden_state = [0.0; HIDDEN_SIZE];
        for h in &mut hidden_state {
            let z: f64 = rng.sample(StandardNormal);
            *h = z * HIDDEN_STATE_INIT_STDDEV;
        }
        Ok(Self {
            layers,
            w_hh,
            hidden_state,
        })
    }

    fn run(&mut self, inputs: &[f64], noise: &mut dyn FnMut() -> f64) -> [f64; OUTPUT_SIZE] {
        let mut hidden = self.layers.hidden_pre_activation(inputs);
        for (j, h) in hidden.iter_mut().enumerate() {
            *h += self.w_hh[j]
                .iter()
                .zip(self.hidden_state.iter())
                .map(|(w, s)| w * s)
                .sum::<f64>();
            *h = (*h + noise()).tanh();
        }
        self.hidden_state = hidden;
        self.layers.finish(hidden)
    }

    pub fn forward(&mut self, inputs: &[f64]) -> [f64; OUTPUT_SIZE] {
        self.run(inputs, &mut || 0.0)
    }

    pub fn hidden_state(&self) -> &[f64; HIDDEN_SIZE] {
        &self.hidden_state
    }

    pub fn reset_state(&mut self) {
        self.hidden_state = [0.0; HIDDEN_SIZE];
    }
}

/// Weights and activations exported for visualization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrainSnapshot {
    pub kind: BrainKind,
    pub input_size: usize,
    pub weights: Vec<f64>,
    pub hidden: Vec<f64>,
    pub outputs: Vec<f64>,
}

#[derive(Clone, Debug)]
pub enum Brain {
    FeedForward(FeedForward),
    Recurrent(Recurrent),
}

impl Brain {
    pub fn new<R: Rng + ?Sized>(
        kind: BrainKind,
        input_size: usize,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<Self, BrainError> {
        Ok(match kind {
            BrainKind::Fnn => Brain::FeedForward(FeedForward::new(input_size, weights)?),
            BrainKind::Rnn => Brain::Recurrent(Recurrent::new(input_size, weights, rng)?),
        })
    }

    /// Decode one weight per `brain_w{i}` gene.
    ///
    /// Absent genes (e.g. a genome built for fewer inputs) are synthesized as
    /// Gaussian draws, with the recurrent diagonal biased toward identity.
    pub fn from_genome<R: Rng + ?Sized>(
        kind: BrainKind,
        input_size: usize,
        genome: &Genome,
        init_stddev: f64,
        rng: &mut R,
    ) -> Result<Self, BrainError> {
        let count = weight_count(kind, input_size);
        let recurrent_start = input_size * HIDDEN_SIZE;
        let recurrent_end = recurrent_start + HIDDEN_SIZE * HIDDEN_SIZE;
        let mut missing = 0usize;
        let weights: Vec<f64> = (0..count)
            .map(|i| match genome.express(&brain_gene_name(i)) {
                Some(w) => w,
                None => {
                    missing += 1;
                    let z: f64 = rng.sample(StandardNormal);
                    let mut w = z * init_stddev;
                    if kind == BrainKind::Rnn && (recurrent_start..recurrent_end).contains(&i) {
                        let offset = i - recurrent_start;
                        if offset / HIDDEN_SIZE == offset % HIDDEN_SIZE {
                            w += RECURRENT_IDENTITY_BIAS;
                        }
                    }
                    w
                }
            })
            .collect();
        if missing > 0 {
            debug!(missing, expected = count, "synthesized missing brain genes");
        }
        Self::new(kind, input_size, &weights, rng)
    }

    pub fn kind(&self) -> BrainKind {
        match self {
            Brain::FeedForward(_) => BrainKind::Fnn,
            Brain::Recurrent(_) => BrainKind::Rnn,
        }
    }

    fn layers(&self) -> &Layers {
        match self {
            Brain::FeedForward(b) => &b.layers,
            Brain::Recurrent(b) => &b.layers,
        }
    }

    pub fn input_size(&self) -> usize {
        self.layers().input_size
    }

    pub fn forward(&mut self, inputs: &[f64]) -> [f64; OUTPUT_SIZE] {
        match self {
            Brain::FeedForward(b) => b.forward(inputs),
            Brain::Recurrent(b) => b.forward(inputs),
        }
    }

    /// Forward pass with Gaussian noise added to each hidden pre-activation.
    pub fn forward_with_noise<R: Rng + ?Sized>(
        &mut self,
        inputs: &[f64],
        rng: &mut R,
        stddev: f64,
    ) -> [f64; OUTPUT_SIZE] {
        let mut noise = || {
            let z: f64 = rng.sample(StandardNormal);
            z * stddev
        };
        match self {
            Brain::FeedForward(b) => b.run(inputs, &mut noise),
            Brain::Recurrent(b) => b.run(inputs, &mut noise),
        }
    }

    /// Activations from the most recent forward pass.
    pub fn hidden_activations(&self) -> [f64; HIDDEN_SIZE] {
        self.layers().last_hidden
    }

    pub fn last_outputs(&self) -> [f64; OUTPUT_SIZE] {
        self.layers().last_outputs
    }

    /// Weights in genome order.
    pub fn weights(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(weight_count(self.kind(), self.input_size()));
        match self {
            Brain::FeedForward(b) => {
                b.layers.push_head(&mut out);
                b.layers.push_tail(&mut out);
            }
            Brain::Recurrent(b) => {
                b.layers.push_head(&mut out);
                for row in &b.w_hh {
                    out.extend_from_slice(row);
                }
                b.layers.push_tail(&mut out);
            }
        }
        out
    }

    pub fn snapshot(&self) -> BrainSnapshot {
        BrainSnapshot {
            kind: self.kind(),
            input_size: self.input_size(),
            weights: self.weights(),
            hidden: self.hidden_activations().to_vec(),
            outputs: self.last_outputs().to_vec(),
        }
    }
}
