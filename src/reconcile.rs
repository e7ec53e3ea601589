//! Link target reconciliation.
//!
//! Each linked entity is checked against the knowledge base and gets at most
//! one correction, tried in this order:
//!
//! 1. remove the link when the target does not exist,
//! 2. replace a redirect with its destination,
//! 3. replace the target with its normalized spelling.
//!
//! A redirect destination is taken as is and not normalized in the same
//! pass; running the pass again picks that up.
//!
//! Every correction goes through a [`DecisionProvider`], so automatic and
//! interactive runs share one code path. The source corpus is never
//! modified: the result is a rewritten copy plus an action log.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::corpus::{Corpus, Document};
use crate::error::{CorpusError, CorpusResult};
use crate::knowledge::{KnowledgeBase, TargetMap, TargetResolution};
use crate::markup::{is_valid_field, render_entity, Entity, Token, RESERVED_CHARS};
use crate::output::{prepare_output_dir, write_documents, RewrittenDocument};

/// Which corrections are enabled. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub remove_non_existent: bool,
    pub normalize: bool,
    pub apply_redirects: bool,
}

impl ReconcilePolicy {
    pub fn any(&self) -> bool {
        self.remove_non_existent || self.normalize || self.apply_redirects
    }
}

/// Kind of a proposed correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    Remove,
    Redirect,
    Normalize,
}

impl Correction {
    /// Whether an interactive user may type a custom target instead.
    pub fn allows_replacement(self) -> bool {
        !matches!(self, Correction::Normalize)
    }

    fn applied(self) -> Action {
        match self {
            Correction::Remove => Action::Removed,
            Correction::Redirect => Action::Redirected,
            Correction::Normalize => Action::Normalized,
        }
    }
}

/// A change offered to the decision provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal<'a> {
    pub correction: Correction,
    pub target: &'a str,
    /// Target after the correction; empty for a removal.
    pub proposed: &'a str,
}

/// Answer to a [`Proposal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Keep the original target; no other correction is tried.
    Decline,
    Replace(String),
}

/// Decides whether proposed corrections are applied.
pub trait DecisionProvider {
    fn decide(&mut self, proposal: &Proposal<'_>) -> CorpusResult<Decision>;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl DecisionProvider for AutoApprove {
    fn decide(&mut self, _proposal: &Proposal<'_>) -> CorpusResult<Decision> {
        Ok(Decision::Accept)
    }
}

/// Asks on a line-oriented terminal.
///
/// `y` or an empty answer accepts, `n` declines and `r` (removals and
/// redirects only) reads a replacement target. Anything else asks again.
pub struct PromptDecider<R, W> {
    input: R,
    output: W,
}

impl PromptDecider<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptDecider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    fn read_line(&mut self) -> CorpusResult<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(CorpusError::InputClosed);
        }
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(line)
    }
}

impl<R: BufRead, W: Write> DecisionProvider for PromptDecider<R, W> {
    fn decide(&mut self, proposal: &Proposal<'_>) -> CorpusResult<Decision> {
        let question = match proposal.correction {
            Correction::Remove => format!("remove non-existing \"{}\"", proposal.target),
            Correction::Redirect => format!(
                "replace \"{}\" with redirect \"{}\"",
                proposal.target, proposal.proposed
            ),
            Correction::Normalize => format!(
                "replace \"{}\" with \"{}\"",
                proposal.target, proposal.proposed
            ),
        };
        let replaceable = proposal.correction.allows_replacement();
        let choices = if replaceable { "[Ynr]" } else { "[Yn]" };

        loop {
            write!(self.output, "{} {}: ", question, choices)?;
            self.output.flush()?;
            let answer = self.read_line()?.trim().to_lowercase();
            match answer.as_str() {
                "" | "y" => return Ok(Decision::Accept),
                "n" => {
                    writeln!(self.output, "keeping \"{}\"", proposal.target)?;
                    return Ok(Decision::Decline);
                }
                "r" if replaceable => {
                    write!(self.output, "replace with: ")?;
                    self.output.flush()?;
                    let replacement = self.read_line()?;
                    if !is_valid_field(&replacement) {
                        writeln!(
                            self.output,
                            "target may not contain {}",
                            RESERVED_CHARS.iter().collect::<String>()
                        )?;
                        continue;
                    }
                    return Ok(Decision::Replace(replacement));
                }
                _ => continue,
            }
        }
    }
}

/// What happened to one entity target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Removed,
    Redirected,
    Normalized,
    /// A user-supplied target was used.
    Replaced,
    /// A proposed correction was refused.
    Declined,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Removed => "removed",
            Action::Redirected => "redirected",
            Action::Normalized => "normalized",
            Action::Replaced => "replaced",
            Action::Declined => "declined",
        };
        f.write_str(name)
    }
}

/// Audit record of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionLogEntry {
    pub file: String,
    pub line: usize,
    pub action: Action,
    pub before: String,
    pub after: String,
}

/// Rewritten corpus and the log of what was changed.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub documents: Vec<RewrittenDocument>,
    pub log: Vec<ActionLogEntry>,
}

impl Reconciliation {
    /// Number of targets actually changed.
    pub fn changes(&self) -> usize {
        self.log
            .iter()
            .filter(|entry| entry.action != Action::Declined)
            .count()
    }
}

/// Pick the single correction that applies to `target`, if any.
pub fn propose(
    target: &str,
    resolution: &TargetResolution,
    policy: ReconcilePolicy,
) -> Option<(Correction, String)> {
    if policy.remove_non_existent && !resolution.exists {
        Some((Correction::Remove, String::new()))
    } else if policy.apply_redirects && resolution.is_redirect() {
        Some((Correction::Redirect, resolution.redirect.clone()))
    } else if policy.normalize && target != resolution.normalized {
        Some((Correction::Normalize, resolution.normalized.clone()))
    } else {
        None
    }
}

/// Reconcile every document, resolving each document's targets in one call.
///
/// Nothing is written; see [`reconcile_into`].
pub fn reconcile(
    corpus: &Corpus,
    kb: &dyn KnowledgeBase,
    policy: ReconcilePolicy,
    decider: &mut dyn DecisionProvider,
) -> CorpusResult<Reconciliation> {
    let mut result = Reconciliation::default();
    for document in corpus.documents() {
        info!("processing {}", document.file_name);
        let targets = if policy.any() {
            kb.resolve_targets(&document.linked_targets())?
        } else {
            TargetMap::new()
        };
        let rewritten = reconcile_document(document, &targets, policy, decider, &mut result.log)?;
        result.documents.push(rewritten);
    }
    Ok(result)
}

/// Check `destination`, reconcile the whole corpus, then write it.
///
/// The destination is checked before the knowledge base is queried, and no
/// file is written unless every document was reconciled.
pub fn reconcile_into(
    corpus: &Corpus,
    kb: &dyn KnowledgeBase,
    policy: ReconcilePolicy,
    decider: &mut dyn DecisionProvider,
    destination: &Path,
) -> CorpusResult<Reconciliation> {
    prepare_output_dir(destination)?;
    let result = reconcile(corpus, kb, policy, decider)?;
    write_documents(destination, &result.documents)?;
    Ok(result)
}

/// Rewrite one document with already resolved targets.
pub fn reconcile_document(
    document: &Document,
    targets: &TargetMap,
    policy: ReconcilePolicy,
    decider: &mut dyn DecisionProvider,
    log: &mut Vec<ActionLogEntry>,
) -> CorpusResult<RewrittenDocument> {
    let mut lines = Vec::with_capacity(document.lines.len());
    for line in &document.lines {
        let mut rendered = String::with_capacity(line.raw.len());
        for token in &line.tokens {
            let entity = match token {
                Token::Text(text) => {
                    rendered.push_str(text);
                    continue;
                }
                Token::Entity(entity) => entity,
            };

            let target = match correct(entity, targets, policy, decider)? {
                Some((action, after)) => {
                    info!(
                        "{}:{}: {} \"{}\" -> \"{}\"",
                        document.file_name, line.number, action, entity.target, after
                    );
                    log.push(ActionLogEntry {
                        file: document.file_name.clone(),
                        line: line.number,
                        action,
                        before: entity.target.clone(),
                        after: after.clone(),
                    });
                    after
                }
                None => entity.target.clone(),
            };
            rendered.push_str(&render_entity(&entity.mention, &entity.class, &target));
        }
        lines.push(rendered);
    }

    Ok(RewrittenDocument {
        file_name: document.file_name.clone(),
        lines,
    })
}

/// Decide the fate of one entity's target. `None` means untouched.
fn correct(
    entity: &Entity,
    targets: &TargetMap,
    policy: ReconcilePolicy,
    decider: &mut dyn DecisionProvider,
) -> CorpusResult<Option<(Action, String)>> {
    if !entity.is_linked() || !policy.any() {
        return Ok(None);
    }
    let resolution = targets
        .get(&entity.target)
        .ok_or_else(|| CorpusError::MissingResolution(entity.target.clone()))?;
    let Some((correction, proposed)) = propose(&entity.target, resolution, policy) else {
        return Ok(None);
    };

    let proposal = Proposal {
        correction,
        target: &entity.target,
        proposed: &proposed,
    };
    let outcome = match decider.decide(&proposal)? {
        Decision::Accept => (correction.applied(), proposed),
        Decision::Decline => {
            debug!("declined {:?} for \"{}\"", correction, entity.target);
            (Action::Declined, entity.target.clone())
        }
        Decision::Replace(value) => (Action::Replaced, value),
    };
    Ok(Some(outcome))
}
