use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::Question;
use crate::value::{FactMap, FactValue};

/// Indices of `questions` in an order where every question comes after the
/// questions it depends on.
///
/// Ties keep declaration order. Dependencies on facts that are not
/// questions add no ordering constraint. Questions caught in a cycle are
/// appended at the end in declaration order.
pub fn dependency_order(questions: &[Question]) -> Vec<usize> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, question) in questions.iter().enumerate() {
        if index.insert(question.id.as_str(), i).is_some() {
            warn!(question = %question.id, "duplicate question id, last definition wins");
        }
    }

    let mut indegree = vec![0usize; questions.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); questions.len()];
    for (i, question) in questions.iter().enumerate() {
        let Some(dependency) = &question.depends_on else {
            continue;
        };
        for variable in dependency.variables() {
            match index.get(variable.as_str()) {
                Some(&j) if j == i => {
                    warn!(question = %question.id, "question depends on itself");
                }
                Some(&j) => {
                    dependents[j].push(i);
                    indegree[i] += 1;
                }
                None => {}
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..questions.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(questions.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < questions.len() {
        let cyclic: Vec<usize> = (0..questions.len()).filter(|&i| indegree[i] > 0).collect();
        warn!(
            questions = ?cyclic.iter().map(|&i| questions[i].id.as_str()).collect::<Vec<_>>(),
            "dependency cycle between questions"
        );
        order.extend(cyclic);
    }
    order
}

/// Resolve answers for rule evaluation.
///
/// Starts from `answers`, fills in answers carried on the questions
/// themselves (the map wins on conflict), then overwrites the answer of
/// every question whose dependency is unmet with
/// [`FactValue::NotApplicable`], before any question depending on it is
/// judged.
#[tracing::instrument(level = "debug", skip_all, fields(questions = questions.len()))]
pub fn preprocess(answers: &FactMap, questions: &[Question]) -> FactMap {
    let mut resolved = answers.clone();
    for question in questions {
        if !resolved.is_present(&question.id) && question.answer.is_present() {
            resolved.insert(question.id.clone(), question.answer.clone());
        }
    }

    for i in dependency_order(questions) {
        let question = &questions[i];
        if !question.is_visible(&resolved) {
            debug!(question = %question.id, "dependency unmet, marking not applicable");
            resolved.insert(question.id.clone(), FactValue::NotApplicable);
        }
    }
    resolved
}

/// Ids of the questions that should be shown, in declaration order.
pub fn visible_questions(answers: &FactMap, questions: &[Question]) -> Vec<String> {
    let resolved = preprocess(answers, questions);
    questions
        .iter()
        .filter(|question| question.is_visible(&resolved))
        .map(|question| question.id.clone())
        .collect()
}
