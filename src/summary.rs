use crate::batch::Outcome;

/// Aggregate view over a batch of outcomes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub significant: usize,
    /// `None` when no record succeeded.
    pub p_values: Option<PValueStats>,
    /// Distinct significance levels in order of first use.
    pub alphas_used: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PValueStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl Summary {
    pub fn new(outcomes: &[Outcome]) -> Self {
        let evaluations = outcomes
            .iter()
            .filter_map(Outcome::as_success)
            .collect::<Vec<_>>();
        let mut p = evaluations.iter().map(|e| e.p_value()).collect::<Vec<_>>();
        p.sort_by(|a, b| a.total_cmp(b));
        let p_values = (!p.is_empty()).then(|| {
            let n = p.len();
            PValueStats {
                min: p[0],
                max: p[n - 1],
                mean: p.iter().sum::<f64>() / n as f64,
                median: if n % 2 == 1 {
                    p[n / 2]
                } else {
                    (p[n / 2 - 1] + p[n / 2]) / 2.0
                },
            }
        });
        let mut alphas_used: Vec<f64> = vec![];
        for e in &evaluations {
            if !alphas_used.iter().any(|a| a.to_bits() == e.alpha_used().to_bits()) {
                alphas_used.push(e.alpha_used());
            }
        }
        Summary {
            total: outcomes.len(),
            succeeded: evaluations.len(),
            failed: outcomes.len() - evaluations.len(),
            significant: evaluations.iter().filter(|e| e.is_significant()).count(),
            p_values,
            alphas_used,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total records:  {}", self.total)?;
        writeln!(f, "Succeeded:      {}", self.succeeded)?;
        writeln!(f, "Failed:         {}", self.failed)?;
        writeln!(f, "Significant:    {}", self.significant)?;
        if let Some(p) = &self.p_values {
            writeln!(f, "Min p-value:    {:.6}", p.min)?;
            writeln!(f, "Max p-value:    {:.6}", p.max)?;
            writeln!(f, "Mean p-value:   {:.6}", p.mean)?;
            writeln!(f, "Median p-value: {:.6}", p.median)?;
        }
        if !self.alphas_used.is_empty() {
            let alphas = self
                .alphas_used
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>();
            writeln!(f, "Alphas used:    {}", alphas.join(", "))?;
        }
        Ok(())
    }
}

/// Fixed-width table with one line per outcome, for terminal display.
pub fn render_table(outcomes: &[Outcome]) -> String {
    let mut out = format!(
        "{:<6} {:<12} {:<12} {:<8} {:<12} {:<12} {:<6} {:<8} {:<8}\n",
        "row", "coef", "std_err", "n", "t", "p", "sig", "alpha", "type"
    );
    out.push_str(&"-".repeat(92));
    out.push('\n');
    for outcome in outcomes {
        match outcome {
            Outcome::Success(e) => out.push_str(&format!(
                "{:<6} {:<12.4} {:<12.4} {:<8} {:<12.4} {:<12.6} {:<6} {:<8.3} {:<8}\n",
                outcome.row_index(),
                e.coefficient(),
                e.std_error(),
                e.sample_size(),
                e.t_statistic(),
                e.p_value(),
                if e.is_significant() { "yes" } else { "no" },
                e.alpha_used(),
                e.regression_type_used(),
            )),
            Outcome::Error(e) => out.push_str(&format!(
                "{:<6} ERROR {}: {}\n",
                e.row_index, e.error_kind, e.error_message
            )),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        batch::{process_batch, Defaults},
        record::RawRecord,
    };

    fn record(coef: f64, se: f64, n: i64, alpha: Option<f64>) -> RawRecord {
        let mut r = RawRecord::new()
            .with("coefficient", coef)
            .with("std_error", se)
            .with("sample_size", n);
        if let Some(alpha) = alpha {
            r.insert("significance_level", alpha);
        }
        r
    }

    #[test]
    fn test_summary() {
        let outcomes = process_batch(
            &[
                record(2.5, 0.8, 100, None),
                record(0.1, 1.0, 30, Some(0.1)),
                record(1.0, 0.0, 30, None),
                record(3.0, 1.0, 20, Some(0.1)),
            ],
            Defaults::default(),
        );
        let s = Summary::new(&outcomes);
        assert_eq!(s.total, 4);
        assert_eq!(s.succeeded, 3);
        assert_eq!(s.failed, 1);
        assert_eq!(s.significant, 2);
        assert_eq!(s.alphas_used, vec![0.05, 0.1]);
        let p = s.p_values.unwrap();
        assert!(p.min <= p.median && p.median <= p.max);
        assert_eq!(p.median, outcomes[3].as_success().unwrap().p_value());
        assert_eq!(p.min, outcomes[0].as_success().unwrap().p_value());
    }

    #[test]
    fn test_render_table() {
        let outcomes = process_batch(
            &[record(2.5, 0.8, 100, None), record(1.0, 0.0, 30, None)],
            Defaults::default(),
        );
        let table = render_table(&outcomes);
        let lines = table.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("1      2.5000"));
        assert!(lines[2].contains("0.002339"));
        assert!(lines[2].contains("yes"));
        assert!(lines[3].starts_with("2      ERROR InvalidInputError"));
    }

    #[test]
    fn test_empty_summary() {
        let s = Summary::new(&[]);
        assert_eq!(s.total, 0);
        assert!(s.p_values.is_none());
        assert!(s.to_string().contains("Total records:  0"));
        assert_eq!(serde_json::to_value(&s).unwrap()["p_values"], json!(null));
    }
}
