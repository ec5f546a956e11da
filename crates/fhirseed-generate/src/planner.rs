use std::collections::BTreeMap;

use rand::Rng;

use fhirseed_plan::{DependentKind, GeneratorConfig, LinkKind, QuantityRule, SubjectOverride};

use crate::errors::GenerationError;

/// Decides how many records of each dependent kind a subject gets.
#[derive(Debug, Clone)]
pub struct QuantityPlanner {
    rules: BTreeMap<DependentKind, QuantityRule>,
}

impl QuantityPlanner {
    /// Resolve the rules of a configuration. Rejects inverted ranges and
    /// probabilities outside `[0, 1]` instead of clamping them.
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let mut rules = BTreeMap::new();
        for (kind, entry) in &config.per_patient {
            let rule = entry.rule();
            if rule.min > rule.max {
                return Err(GenerationError::Configuration(format!(
                    "{}: min ({}) is greater than max ({})",
                    kind.key(),
                    rule.min,
                    rule.max
                )));
            }
            let gates = std::iter::once(rule.probability)
                .chain(LinkKind::ALL.into_iter().map(|link| rule.link(link)))
                .flatten();
            for probability in gates {
                if !(0.0..=1.0).contains(&probability) {
                    return Err(GenerationError::Configuration(format!(
                        "{}: probability {probability} is outside [0, 1]",
                        kind.key()
                    )));
                }
            }
            rules.insert(*kind, rule);
        }
        Ok(Self { rules })
    }

    /// Count for one kind and one subject, drawn uniformly within the
    /// inclusive range. A fixed count from the subject override wins.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        kind: DependentKind,
        subject: Option<&SubjectOverride>,
        rng: &mut R,
    ) -> u32 {
        if let Some(count) = subject.and_then(|item| item.fixed_count(kind)) {
            return count;
        }
        let Some(rule) = self.rules.get(&kind) else {
            return 0;
        };
        if let Some(probability) = rule.probability
            && !rng.random_bool(probability)
        {
            return 0;
        }
        rng.random_range(rule.min..=rule.max)
    }

    /// Configured probability of an optional link, or its default.
    pub fn link_probability(&self, kind: DependentKind, link: LinkKind) -> f64 {
        self.rules
            .get(&kind)
            .and_then(|rule| rule.link(link))
            .or_else(|| {
                kind.links()
                    .iter()
                    .find(|(known, _)| *known == link)
                    .map(|(_, probability)| *probability)
            })
            .unwrap_or(0.0)
    }

    /// Draw whether an optional link is made.
    pub fn draw_link<R: Rng + ?Sized>(&self, kind: DependentKind, link: LinkKind, rng: &mut R) -> bool {
        rng.random_bool(self.link_probability(kind, link))
    }
}
