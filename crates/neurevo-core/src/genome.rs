use crate::config::MutationConfig;
use crate::phenotype::Trait;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dominance sums below this fall back to the plain mean.
const EXPRESSION_EPSILON: f64 = 1e-9;
/// Chromosome 0 carries one gene per phenotype trait.
pub const TRAIT_CHROMOSOME: usize = 0;
pub const BRAIN_GENES_PER_CHROMOSOME: usize = 64;

pub fn brain_gene_name(index: usize) -> String {
    format!("brain_w{index}")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    #[default]
    Female,
    Male,
}

impl Sex {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            Sex::Female
        } else {
            Sex::Male
        }
    }
}

/// One inherited copy of a gene value. Copied, never shared.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Allele {
    pub value: f64,
    /// Expression weight in `[0, 1]`.
    pub dominance: f64,
}

impl Allele {
    pub fn new(value: f64, dominance: f64) -> Self {
        Self {
            value,
            dominance: dominance.clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gene {
    name: String,
    pub a: Allele,
    pub b: Allele,
}

impl Gene {
    pub fn new(name: impl Into<String>, a: Allele, b: Allele) -> Self {
        Self {
            name: name.into(),
            a,
            b,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dominance-weighted mean of both alleles.
    pub fn express(&self) -> f64 {
        let total = self.a.dominance + self.b.dominance;
        if total < EXPRESSION_EPSILON {
            (self.a.value + self.b.value) / 2.0
        } else {
            (self.a.value * self.a.dominance + self.b.value * self.b.dominance) / total
        }
    }

    fn alleles_mut(&mut self) -> [&mut Allele; 2] {
        [&mut self.a, &mut self.b]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chromosome {
    genes: Vec<Gene>,
}

impl Chromosome {
    pub fn new(genes: Vec<Gene>) -> Self {
        Self { genes }
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// One randomly chosen allele per gene.
    pub fn gamete<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Allele> {
        self.genes
            .iter()
            .map(|g| if rng.random_bool(0.5) { g.a } else { g.b })
            .collect()
    }

    /// Single-point crossover of one gamete from each parent.
    ///
    /// With probability `rate` (and more than one gene) the gametes swap tails at a
    /// random split; otherwise they pass through unchanged. Gene names come from `a`.
    pub fn crossover<R: Rng + ?Sized>(
        a: &Chromosome,
        b: &Chromosome,
        rate: f64,
        rng: &mut R,
    ) -> (Chromosome, Chromosome) {
        let n = a.len().min(b.len());
        let gamete_a = a.gamete(rng);
        let gamete_b = b.gamete(rng);
        let point = if n > 1 && rng.random::<f64>() < rate {
            Some(rng.random_range(1..n))
        } else {
            None
        };
        Self::recombine(a, &gamete_a[..n], &gamete_b[..n], point)
    }

    /// Pair two gametes gene-by-gene, optionally swapping tails at `point`.
    pub fn recombine(
        template: &Chromosome,
        gamete_a: &[Allele],
        gamete_b: &[Allele],
        point: Option<usize>,
    ) -> (Chromosome, Chromosome) {
        let n = gamete_a.len().min(gamete_b.len()).min(template.len());
        let split = point.unwrap_or(n).min(n);
        let mut first = Vec::with_capacity(n);
        let mut second = Vec::with_capacity(n);
        for i in 0..n {
            let (x, y) = if i < split {
                (gamete_a[i], gamete_b[i])
            } else {
                (gamete_b[i], gamete_a[i])
            };
            let name = template.genes[i].name.clone();
            first.push(Gene::new(name.clone(), x, y));
            second.push(Gene::new(name, y, x));
        }
        (Chromosome::new(first), Chromosome::new(second))
    }
}

/// Architecture-defined shape of a genome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenomeLayout {
    pub brain_weight_count: usize,
    pub weight_init_stddev: f64,
}

impl GenomeLayout {
    pub fn new(brain_weight_count: usize, weight_init_stddev: f64) -> Self {
        Self {
            brain_weight_count,
            weight_init_stddev,
        }
    }

    pub fn chromosome_count(&self) -> usize {
        1 + self.brain_weight_count.div_ceil(BRAIN_GENES_PER_CHROMOSOME)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MutationRates {
    pub mutation_rate: f64,
    pub point_stddev: f64,
    pub large_chance: f64,
    pub large_stddev: f64,
    pub dominance_flip_rate: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self::from(&MutationConfig::default())
    }
}

impl From<&MutationConfig> for MutationRates {
    fn from(cfg: &MutationConfig) -> Self {
        Self {
            mutation_rate: cfg.mutation_rate,
            point_stddev: cfg.point_mutation_stddev,
            large_chance: cfg.large_mutation_chance,
            large_stddev: cfg.large_mutation_stddev,
            dominance_flip_rate: cfg.dominance_mutation_rate,
        }
    }
}

/// Diploid genome: trait chromosome followed by brain-weight chromosomes.
#[derive(Clone, Debug)]
pub struct Genome {
    chromosomes: Vec<Chromosome>,
    sex: Sex,
    /// name -> (chromosome, gene). Layout is fixed, so the index is built once.
    index: HashMap<String, (usize, usize)>,
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.sex == other.sex && self.chromosomes == other.chromosomes
    }
}

impl Genome {
    pub fn new(chromosomes: Vec<Chromosome>, sex: Sex) -> Self {
        let mut index = HashMap::new();
        for (c, chromosome) in chromosomes.iter().enumerate() {
            for (g, gene) in chromosome.genes.iter().enumerate() {
                index.entry(gene.name.clone()).or_insert((c, g));
            }
        }
        Self {
            chromosomes,
            sex,
            index,
        }
    }

    pub fn random<R: Rng + ?Sized>(layout: &GenomeLayout, rng: &mut R) -> Self {
        let trait_genes = Trait::ALL
            .iter()
            .map(|t| {
                let a = Allele::new(rng.random::<f64>(), rng.random::<f64>());
                let b = Allele::new(rng.random::<f64>(), rng.random::<f64>());
                Gene::new(t.name(), a, b)
            })
            .collect();
        let mut chromosomes = vec![Chromosome::new(trait_genes)];

        let mut brain_genes = Vec::with_capacity(BRAIN_GENES_PER_CHROMOSOME);
        for i in 0..layout.brain_weight_count {
            let mut allele = || {
                let z: f64 = rng.sample(StandardNormal);
                Allele::new(z * layout.weight_init_stddev, rng.random::<f64>())
            };
            let (a, b) = (allele(), allele());
            brain_genes.push(Gene::new(brain_gene_name(i), a, b));
            if brain_genes.len() == BRAIN_GENES_PER_CHROMOSOME {
                chromosomes.push(Chromosome::new(std::mem::take(&mut brain_genes)));
            }
        }
        if !brain_genes.is_empty() {
            chromosomes.push(Chromosome::new(brain_genes));
        }
        Self::new(chromosomes, Sex::random(rng))
    }

    /// Per-chromosome crossover of two parents; sex is drawn independently.
    pub fn from_parents<R: Rng + ?Sized>(a: &Genome, b: &Genome, rate: f64, rng: &mut R) -> Self {
        let chromosomes = a
            .chromosomes
            .iter()
            .zip(b.chromosomes.iter())
            .map(|(ca, cb)| {
                let (first, second) = Chromosome::crossover(ca, cb, rate, rng);
                if rng.random_bool(0.5) {
                    first
                } else {
                    second
                }
            })
            .collect();
        Self::new(chromosomes, Sex::random(rng))
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn gene_count(&self) -> usize {
        self.chromosomes.iter().map(Chromosome::len).sum()
    }

    pub fn get_gene(&self, name: &str) -> Option<&Gene> {
        let &(c, g) = self.index.get(name)?;
        self.chromosomes.get(c)?.genes.get(g)
    }

    pub fn express(&self, name: &str) -> Option<f64> {
        self.get_gene(name).map(Gene::express)
    }

    /// Gaussian point mutations, rare large jumps, and dominance flips.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R, rates: &MutationRates) {
        for (c, chromosome) in self.chromosomes.iter_mut().enumerate() {
            let normalized = c == TRAIT_CHROMOSOME;
            for gene in &mut chromosome.genes {
                for allele in gene.alleles_mut() {
                    if rng.random::<f64>() < rates.mutation_rate {
                        let stddev = if rng.random::<f64>() < rates.large_chance {
                            rates.large_stddev
                        } else {
                            rates.point_stddev
                        };
                        let z: f64 = rng.sample(StandardNormal);
                        allele.value += z * stddev;
                        if normalized {
                            allele.value = allele.value.clamp(0.0, 1.0);
                        }
                    }
                    if rng.random::<f64>() < rates.dominance_flip_rate {
                        allele.dominance = 1.0 - allele.dominance;
                    }
                }
            }
        }
    }

    /// Expressed trait genes in [`Trait::ALL`] order; missing genes read as 0.5.
    pub fn trait_expressions(&self) -> Vec<f64> {
        Trait::ALL
            .iter()
            .map(|t| self.express(t.name()).unwrap_or(0.5))
            .collect()
    }

    /// Mean absolute difference between expressed trait genes.
    pub fn trait_distance(&self, other: &Genome) -> f64 {
        let mine = self.trait_expressions();
        let theirs = other.trait_expressions();
        if mine.is_empty() {
            return 0.0;
        }
        mine.iter()
            .zip(theirs.iter())
            .map(|(x, y)| (x - y).abs())
            .sum::<f64>()
            / mine.len() as f64
    }
}
