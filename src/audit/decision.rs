use super::classifier::Verdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReason {
    pub rule_id: String,
    pub description: String,
    pub matched: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeCause {
    ClassifierUnavailable,
    Inconclusive { status: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Allow,
    Block { reason: BlockReason },
    // forwarded anyway, the classifier gave nothing to act on
    Degraded { cause: DegradeCause },
}

pub fn decide(verdict: Option<&Verdict>) -> AuditOutcome {
    let Some(verdict) = verdict else {
        return AuditOutcome::Degraded {
            cause: DegradeCause::ClassifierUnavailable,
        };
    };

    if !verdict.is_done() {
        return AuditOutcome::Degraded {
            cause: DegradeCause::Inconclusive {
                status: verdict.status.clone(),
            },
        };
    }

    match verdict.verdict() {
        "malicious" => AuditOutcome::Block {
            reason: BlockReason {
                rule_id: verdict.rule_id(),
                description: verdict.description().to_string(),
                matched: verdict.matched().to_string(),
            },
        },
        // "security" and anything else pass
        _ => AuditOutcome::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::classifier::VerdictData;

    fn verdict(status: &str, verdict: &str) -> Verdict {
        Verdict {
            status: status.to_string(),
            verdict: Some(verdict.to_string()),
            rule_id: Some(serde_json::json!("R-7")),
            data: Some(VerdictData {
                descr: Some("jailbreak attempt".into()),
                match_string: Some("DAN".into()),
            }),
        }
    }

    #[test]
    fn test_malicious_done_blocks() {
        let outcome = decide(Some(&verdict("done", "malicious")));
        assert_eq!(
            outcome,
            AuditOutcome::Block {
                reason: BlockReason {
                    rule_id: "R-7".into(),
                    description: "jailbreak attempt".into(),
                    matched: "DAN".into(),
                }
            }
        );
    }

    #[test]
    fn test_security_verdict_allows() {
        assert_eq!(decide(Some(&verdict("done", "security"))), AuditOutcome::Allow);
        assert_eq!(decide(Some(&verdict("done", "clean"))), AuditOutcome::Allow);
    }

    #[test]
    fn test_not_done_degrades() {
        assert_eq!(
            decide(Some(&verdict("queued", "malicious"))),
            AuditOutcome::Degraded {
                cause: DegradeCause::Inconclusive { status: "queued".into() }
            }
        );
    }

    #[test]
    fn test_missing_verdict_degrades() {
        assert_eq!(
            decide(None),
            AuditOutcome::Degraded {
                cause: DegradeCause::ClassifierUnavailable
            }
        );
    }
}
