use crate::diff::TranslationUnit;
use crate::error::TranslationError;
use crate::estimator::estimate_tokens;
use crate::options::TranslationOptions;
use crate::prompt::build_user_payload;

/// Ordered, non-empty slice of the backlog bound for one request.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub units: Vec<TranslationUnit>,
}

impl Chunk {
    pub fn keys(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.key.as_str()).collect()
    }
}

/// Partition the backlog into chunks whose serialized payload fits the
/// token budget and whose item count stays under `max_chunk_items`.
/// Emission order follows backlog order, so the same input always
/// yields the same plan.
///
/// A unit that cannot fit a request even alone fails the whole plan
/// with `BudgetExceeded` before any request is issued; content is never
/// silently truncated.
pub fn plan_chunks(
    units: &[TranslationUnit],
    options: &TranslationOptions,
    system_prompt: &str,
) -> Result<Vec<Chunk>, TranslationError> {
    if units.is_empty() {
        return Ok(Vec::new());
    }

    let budget = options.chunk_budget(estimate_tokens(system_prompt));
    let max_items = options.max_chunk_items.max(1);

    let payload_cost = |slice: &[TranslationUnit]| estimate_tokens(&build_user_payload(slice));

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut cur: Vec<TranslationUnit> = Vec::new();

    for unit in units {
        let solo = payload_cost(std::slice::from_ref(unit));
        if solo > budget {
            return Err(TranslationError::BudgetExceeded {
                key: unit.key.clone(),
                estimated: solo,
                budget,
            });
        }

        if !cur.is_empty() {
            cur.push(unit.clone());
            let fits = cur.len() <= max_items && payload_cost(&cur) <= budget;
            if !fits {
                let unit = cur.pop().expect("candidate unit");
                chunks.push(Chunk { units: cur });
                cur = vec![unit];
            }
        } else {
            cur.push(unit.clone());
        }
    }
    if !cur.is_empty() {
        chunks.push(Chunk { units: cur });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::plan_chunks;
    use crate::diff::TranslationUnit;
    use crate::error::TranslationError;
    use crate::options::TranslationOptions;

    fn units(n: usize, text: &str) -> Vec<TranslationUnit> {
        (0..n)
            .map(|i| TranslationUnit {
                key: format!("key_{i:03}"),
                source_text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn every_key_appears_exactly_once() {
        let input = units(137, "Some UI string of moderate length");
        let opt = TranslationOptions {
            max_chunk_items: 10,
            ..TranslationOptions::default()
        };
        let chunks = plan_chunks(&input, &opt, "sys").expect("plan");

        let mut seen: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.units.iter().map(|u| u.key.clone()))
            .collect();
        assert_eq!(seen.len(), input.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), input.len());
        assert!(chunks.iter().all(|c| c.units.len() <= 10));
        assert!(chunks.iter().all(|c| !c.units.is_empty()));
    }

    #[test]
    fn token_budget_forces_splits() {
        let long = "x".repeat(2000);
        let input = units(12, &long);
        let opt = TranslationOptions {
            context_limit: 3000,
            ..TranslationOptions::default()
        };
        // ~500 tokens per unit against a ~2000 token budget.
        let chunks = plan_chunks(&input, &opt, "sys").expect("plan");
        assert!(chunks.len() >= 3, "got {} chunks", chunks.len());
        let total: usize = chunks.iter().map(|c| c.units.len()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn oversize_unit_fails_before_any_request() {
        let mut input = units(3, "small");
        input.push(TranslationUnit {
            key: "huge".into(),
            source_text: "y".repeat(200_000),
        });
        let opt = TranslationOptions::default();
        match plan_chunks(&input, &opt, "sys") {
            Err(TranslationError::BudgetExceeded { key, estimated, budget }) => {
                assert_eq!(key, "huge");
                assert!(estimated > budget);
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
    }

    #[test]
    fn plan_is_deterministic() {
        let input = units(40, "Stable ordering matters for retries");
        let opt = TranslationOptions {
            max_chunk_items: 7,
            ..TranslationOptions::default()
        };
        let a = plan_chunks(&input, &opt, "sys").expect("plan a");
        let b = plan_chunks(&input, &opt, "sys").expect("plan b");
        let keys = |chunks: &[super::Chunk]| {
            chunks
                .iter()
                .map(|c| c.units.iter().map(|u| u.key.clone()).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&a), keys(&b));
    }
}
