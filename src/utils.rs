use crate::param::Param;
use crate::population::Population;

/// Log an info line, colored when the terminal display allows it
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {
        if $colorful {
            log::info!($($arg)*);
        } else {
            log::info!("{}", $crate::utils::strip_ansi(&format!($($arg)*)));
        }
    };
}

/// a macro to declare simple Vec<String>
#[macro_export]
macro_rules! string_vec {
    ($($x:expr),*) => {
        vec![$($x.into()),*]
    };
}

/// Remove ANSI escape sequences (used when logging to a file)
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(n) = chars.next() {
                    if n.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Population mean and standard deviation (n denominator)
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Round to `digits` decimal digits
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Sorted unique labels
pub fn unique_classes(y: &[u8]) -> Vec<u8> {
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Index of the largest value (first one on ties)
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Normalised exponentials, shifted by the maximum for stability
pub fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = raw.iter().map(|r| (r - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|e| e / sum).collect()
}

pub fn display_epoch_legend(param: &Param) -> String {
    format!(
        "\x1b[1;97mGeneration | best fit [k] | mean k | population ({} individuals, {} elites)\x1b[0m",
        param.ga.population_size, param.ga.elite_number
    )
}

/// One line summary of a sorted population
pub fn display_epoch(pop: &Population, epoch: usize) -> String {
    if pop.individuals.is_empty() {
        return format!("#{:<4} | empty population", epoch);
    }
    let best = &pop.individuals[0];
    let mean_k = pop.individuals.iter().map(|i| i.k as f64).sum::<f64>()
        / pop.individuals.len() as f64;
    format!(
        "#{:<4} | \x1b[1;92m{:.4}\x1b[0m [k={}] | {:.2} | {}",
        epoch,
        best.fit,
        best.k,
        mean_k,
        pop.individuals
            .iter()
            .map(|i| format!("{:.3}", i.fit))
            .collect::<Vec<_>>()
            .join(" ")
    )
}
