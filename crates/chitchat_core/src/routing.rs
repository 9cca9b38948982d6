//! crates/chitchat_core/src/routing.rs
//!
//! Decides which AI friends reply to a chat message.
//!
//! The primary reasoning provider is asked for a structured `{friends: [..]}`
//! answer. If that answer is missing or malformed, a secondary provider is
//! asked with a locally validated schema. If both fail, a random slice of the
//! active roster is used. Every remote outcome is classified into a
//! `ProviderOutcome` and `next_step` picks what happens next, so nothing past
//! this module ever sees a provider error.
//!
//! Repeated names in a result are meaningful (the friend speaks again) and
//! are never deduplicated.

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{AiFriend, User};
use crate::ports::{OutputSchema, Prompt, ReasoningService};
use crate::presentation::display_name;

pub const RESPONSE_SCHEMA_NAME: &str = "respondingFriends";
pub const DEFAULT_REASONING_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RANDOM_RESPONDERS: usize = 3;


const SYSTEM_INSTRUCTIONS: &str = r#"You are an AI tasked with determining which friends in a group chat should respond to a message. Your role is to analyze the message content, user context, and friends' profiles to make informed decisions. Follow these guidelines:

1. If a user directly addresses a specific friend by name, that friend must be included in the response.
2. Select 1 to 4 friends who are most relevant to the conversation based on their personalities, about, and the message content.
3. If the user wants to talk to all friends at once then you must respond with every friend's name.
4. A friend can be selected multiple times if they remain highly relevant to the ongoing conversation, for example [Allen, Tom, Allen, John, Doe, Doe].
5. Consider the dynamics of the group and aim to create engaging and diverse interactions."#;

/// The schema of a routing answer: an object with an array of friend names.
pub fn responding_friends_schema() -> OutputSchema {
    OutputSchema::new(
        RESPONSE_SCHEMA_NAME,
        json!({
            "type": "object",
            "properties": {
                "friends": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["friends"],
            "additionalProperties": false
        }),
    )
}

//=========================================================================================
// Outcome classification and step policy
//=========================================================================================

/// What a single provider attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// Usable friend names, canonicalized against the active roster.
    Success(Vec<String>),
    /// The provider answered, but not with an object holding an array of known names.
    SchemaFailure(String),
    /// The call itself failed or timed out.
    ProviderFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStage {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingStep {
    Accept(Vec<String>),
    TryFallback,
    RandomPick,
}

/// Chooses the next action for an outcome at a given stage.
pub fn next_step(stage: RoutingStage, outcome: ProviderOutcome) -> RoutingStep {
    match (stage, outcome) {
        (_, ProviderOutcome::Success(names)) => RoutingStep::Accept(names),
        (RoutingStage::Primary, _) => RoutingStep::TryFallback,
        (RoutingStage::Fallback, _) => RoutingStep::RandomPick,
    }
}

/// Checks a structured payload and maps its names onto the active roster.
///
/// Matching is case-insensitive; names that match no active friend are dropped.
pub fn classify(payload: &Value, active: &[&AiFriend]) -> ProviderOutcome {
    let Some(items) = payload.get("friends").and_then(Value::as_array) else {
        return ProviderOutcome::SchemaFailure("payload has no 'friends' array".to_string());
    };

    let names: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| {
            let wanted = raw.trim();
            active
                .iter()
                .find(|f| f.name.trim().eq_ignore_ascii_case(wanted))
                .map(|f| f.name.clone())
        })
        .collect();

    if names.is_empty() {
        return ProviderOutcome::SchemaFailure(format!(
            "none of the {} returned names is an active friend",
            items.len()
        ));
    }
    ProviderOutcome::Success(names)
}

//=========================================================================================
// Message inspection
//=========================================================================================

fn name_pattern(name: &str) -> Option<Regex> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Regex::new(&format!(
        r"(?i)(?:^|[^\p{{L}}\p{{N}}_]){}(?:$|[^\p{{L}}\p{{N}}_])",
        regex::escape(name)
    ))
    .ok()
}

/// Active friends whose name appears as a whole word in the message.
pub fn mentioned_friends<'a>(message: &str, active: &[&'a AiFriend]) -> Vec<&'a AiFriend> {
    active
        .iter()
        .copied()
        .filter(|f| name_pattern(&f.name).is_some_and(|re| re.is_match(message)))
        .collect()
}

fn everyone_regex() -> &'static Regex {
    static EVERYONE: OnceLock<Regex> = OnceLock::new();
    EVERYONE.get_or_init(|| {
        Regex::new(r"(?i)\b(everyone|everybody|all of you|you all|y'all|all friends|guys)\b")
            .expect("everyone pattern is valid")
    })
}

/// True when the message speaks to the whole group rather than to anyone in particular.
pub fn addresses_everyone(message: &str) -> bool {
    everyone_regex().is_match(message)
}

/// Enforces the hard rules on a provider answer: named friends are present,
/// and an "everyone" message reaches the whole active roster.
fn enforce_rules(names: Vec<String>, message: &str, active: &[&AiFriend]) -> Vec<String> {
    let mut names: Vec<String> = mentioned_friends(message, active)
        .into_iter()
        .filter(|f| !names.contains(&f.name))
        .map(|f| f.name.clone())
        .chain(names.iter().cloned())
        .collect();

    if addresses_everyone(message) {
        for friend in active {
            if !names.contains(&friend.name) {
                names.push(friend.name.clone());
            }
        }
    }
    names
}

/// Picks a shuffled slice of one to three active friends.
///
/// Friends named in the message are placed first. The slice never grows past
/// three, so only the first three named friends survive a crowded message.
pub fn random_pick<R: Rng + ?Sized>(message: &str, active: &[&AiFriend], rng: &mut R) -> Vec<String> {
    if active.is_empty() {
        return Vec::new();
    }
    let mentioned = mentioned_friends(message, active);

    let mut rest: Vec<&AiFriend> = active
        .iter()
        .copied()
        .filter(|f| !mentioned.iter().any(|m| m.id == f.id))
        .collect();
    rest.shuffle(rng);

    let upper = MAX_RANDOM_RESPONDERS.min(active.len());
    let size = rng
        .random_range(1..=upper)
        .max(mentioned.len())
        .min(upper);

    mentioned
        .into_iter()
        .chain(rest)
        .take(size)
        .map(|f| f.name.clone())
        .collect()
}

//=========================================================================================
// Prompt
//=========================================================================================

pub fn build_prompt(message: &str, user: &User, active: &[&AiFriend]) -> Prompt {
    let friend_lines = active
        .iter()
        .map(|f| format!("- {} ({})", f.name, f.persona))
        .collect::<Vec<_>>()
        .join("\n");

    let profiles: Vec<Value> = active
        .iter()
        .map(|f| json!({ "name": f.name, "persona": f.persona, "about": f.about }))
        .collect();
    let profiles = serde_json::to_string_pretty(&profiles).unwrap_or_else(|_| "[]".to_string());

    let user_prompt = format!(
        r#"User: {user_name}
User persona: {user_persona}

Active Friends:
{friend_lines}

Friend Profiles:
{profiles}

Latest Message: "{message}"

Based on the provided information, determine which friends should respond to this message. Consider the message content, the user's profile, and the friends' personalities and about. Provide your response as an array of friend names."#,
        user_name = display_name(Some(user)),
        user_persona = user.persona,
    );

    Prompt {
        system: SYSTEM_INSTRUCTIONS.to_string(),
        user: user_prompt,
    }
}

//=========================================================================================
// The Policy
//=========================================================================================

pub struct RoutingPolicy {
    primary: Arc<dyn ReasoningService>,
    fallback: Arc<dyn ReasoningService>,
    timeout: Duration,
}

impl RoutingPolicy {
    pub fn new(primary: Arc<dyn ReasoningService>, fallback: Arc<dyn ReasoningService>) -> Self {
        Self {
            primary,
            fallback,
            timeout: DEFAULT_REASONING_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the names of the friends that should reply, possibly with repeats.
    ///
    /// `None` only when no roster was supplied; an empty list when the roster
    /// has no active friends. Never fails.
    pub async fn route(
        &self,
        message: &str,
        user: &User,
        roster: Option<&[AiFriend]>,
    ) -> Option<Vec<String>> {
        let roster = roster?;
        let active: Vec<&AiFriend> = roster.iter().filter(|f| f.status).collect();
        if active.is_empty() {
            info!("No active friends for user {}; nobody will reply.", user.id);
            return Some(Vec::new());
        }

        let prompt = build_prompt(message, user, &active);
        let schema = responding_friends_schema();

        let mut stage = RoutingStage::Primary;
        loop {
            let outcome = self.attempt(stage, &prompt, &schema, &active).await;
            if let ProviderOutcome::SchemaFailure(reason) | ProviderOutcome::ProviderFailure(reason) =
                &outcome
            {
                warn!("Routing {:?} attempt failed for user {}: {}", stage, user.id, reason);
            }

            match next_step(stage, outcome) {
                RoutingStep::Accept(names) => {
                    let names = enforce_rules(names, message, &active);
                    info!("Routing {:?} selected {:?} for user {}", stage, names, user.id);
                    return Some(names);
                }
                RoutingStep::TryFallback => stage = RoutingStage::Fallback,
                RoutingStep::RandomPick => {
                    let names = random_pick(message, &active, &mut rand::rng());
                    info!("Routing fell back to random pick {:?} for user {}", names, user.id);
                    return Some(names);
                }
            }
        }
    }

    async fn attempt(
        &self,
        stage: RoutingStage,
        prompt: &Prompt,
        schema: &OutputSchema,
        active: &[&AiFriend],
    ) -> ProviderOutcome {
        let provider = match stage {
            RoutingStage::Primary => &self.primary,
            RoutingStage::Fallback => {
                if let Err(e) = schema.validate() {
                    return ProviderOutcome::SchemaFailure(format!("invalid request schema: {}", e));
                }
                &self.fallback
            }
        };

        match tokio::time::timeout(self.timeout, provider.complete_structured(prompt, schema)).await {
            Ok(Ok(payload)) => classify(&payload, active),
            Ok(Err(e)) => ProviderOutcome::ProviderFailure(e.to_string()),
            Err(_) => ProviderOutcome::ProviderFailure(format!(
                "no answer within {}s",
                self.timeout.as_secs_f32()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{friend, user};
    use crate::testing::{Reply, ScriptedReasoner};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn roster() -> Vec<AiFriend> {
        vec![
            friend("Allen", true),
            friend("Tom", true),
            friend("John", true),
            friend("Doe", false),
        ]
    }

    fn policy(primary: Vec<Reply>, fallback: Vec<Reply>) -> (Arc<ScriptedReasoner>, Arc<ScriptedReasoner>, RoutingPolicy) {
        let p = Arc::new(ScriptedReasoner::new(primary));
        let f = Arc::new(ScriptedReasoner::new(fallback));
        let policy = RoutingPolicy::new(p.clone(), f.clone()).with_timeout(Duration::from_millis(50));
        (p, f, policy)
    }

    #[test]
    fn step_policy_walks_the_chain() {
        assert_eq!(
            next_step(RoutingStage::Primary, ProviderOutcome::Success(vec!["Tom".into()])),
            RoutingStep::Accept(vec!["Tom".into()])
        );
        assert_eq!(
            next_step(RoutingStage::Primary, ProviderOutcome::SchemaFailure("x".into())),
            RoutingStep::TryFallback
        );
        assert_eq!(
            next_step(RoutingStage::Primary, ProviderOutcome::ProviderFailure("x".into())),
            RoutingStep::TryFallback
        );
        assert_eq!(
            next_step(RoutingStage::Fallback, ProviderOutcome::ProviderFailure("x".into())),
            RoutingStep::RandomPick
        );
    }

    #[test]
    fn classify_keeps_duplicates_and_canonical_names() {
        let r = roster();
        let active: Vec<&AiFriend> = r.iter().filter(|f| f.status).collect();
        let outcome = classify(&json!({ "friends": ["allen", "Tom", "ALLEN", "Ghost", 7] }), &active);
        assert_eq!(
            outcome,
            ProviderOutcome::Success(vec!["Allen".into(), "Tom".into(), "Allen".into()])
        );
    }

    #[test]
    fn classify_rejects_wrong_shapes() {
        let r = roster();
        let active: Vec<&AiFriend> = r.iter().filter(|f| f.status).collect();
        assert!(matches!(classify(&json!(["Tom"]), &active), ProviderOutcome::SchemaFailure(_)));
        assert!(matches!(classify(&json!({ "friends": "Tom" }), &active), ProviderOutcome::SchemaFailure(_)));
        assert!(matches!(classify(&json!({ "friends": [] }), &active), ProviderOutcome::SchemaFailure(_)));
        // Inactive friends are not eligible.
        assert!(matches!(classify(&json!({ "friends": ["Doe"] }), &active), ProviderOutcome::SchemaFailure(_)));
    }

    #[test]
    fn mentions_are_whole_words() {
        let r = roster();
        let active: Vec<&AiFriend> = r.iter().filter(|f| f.status).collect();
        let names = |m: &str| -> Vec<String> {
            mentioned_friends(m, &active).iter().map(|f| f.name.clone()).collect()
        };
        assert_eq!(names("hey tom, what's up?"), vec!["Tom"]);
        assert!(names("tomorrow is sunny").is_empty());
        assert_eq!(names("Allen and John!"), vec!["Allen", "John"]);
    }

    #[tokio::test]
    async fn primary_answer_is_used() {
        let (p, f, policy) = policy(vec![Reply::Json(json!({ "friends": ["Tom", "Tom", "John"] }))], vec![]);
        let names = policy.route("what do you think?", &user("Ana"), Some(&roster())).await;
        assert_eq!(names, Some(vec!["Tom".to_string(), "Tom".to_string(), "John".to_string()]));
        assert_eq!(p.calls(), 1);
        assert_eq!(f.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_primary_falls_back() {
        let (p, f, policy) = policy(
            vec![Reply::Json(json!({ "speakers": ["Tom"] }))],
            vec![Reply::Json(json!({ "friends": ["John"] }))],
        );
        let names = policy.route("thoughts?", &user("Ana"), Some(&roster())).await;
        assert_eq!(names, Some(vec!["John".to_string()]));
        assert_eq!((p.calls(), f.calls()), (1, 1));
    }

    #[tokio::test]
    async fn named_friend_is_always_included() {
        let (_, _, policy) = policy(vec![Reply::Json(json!({ "friends": ["Tom"] }))], vec![]);
        let names = policy
            .route("Allen, can you help?", &user("Ana"), Some(&roster()))
            .await
            .unwrap();
        assert_eq!(names, vec!["Allen".to_string(), "Tom".to_string()]);
    }

    #[tokio::test]
    async fn everyone_reaches_the_whole_active_roster() {
        let (_, _, policy) = policy(vec![Reply::Json(json!({ "friends": ["Tom"] }))], vec![]);
        let names = policy
            .route("Hi everyone!", &user("Ana"), Some(&roster()))
            .await
            .unwrap();
        assert_eq!(names, vec!["Tom".to_string(), "Allen".to_string(), "John".to_string()]);
    }

    #[tokio::test]
    async fn unresponsive_providers_yield_random_active_slice() {
        for _ in 0..20 {
            let (p, f, policy) = policy(vec![Reply::Hang], vec![Reply::Fail]);
            let r = roster();
            let names = policy.route("hello", &user("Ana"), Some(&r)).await.unwrap();
            assert!((1..=3).contains(&names.len()), "got {:?}", names);
            assert!(names.iter().all(|n| ["Allen", "Tom", "John"].contains(&n.as_str())));
            assert_eq!((p.calls(), f.calls()), (1, 1));
        }
    }

    #[tokio::test]
    async fn random_fallback_keeps_named_friend() {
        for _ in 0..20 {
            let (_, _, policy) = policy(vec![], vec![]);
            let names = policy.route("john?", &user("Ana"), Some(&roster())).await.unwrap();
            assert_eq!(names[0], "John");
        }
    }

    #[tokio::test]
    async fn empty_and_missing_rosters() {
        let (p, _, policy) = policy(vec![], vec![]);
        assert_eq!(policy.route("hi", &user("Ana"), None).await, None);

        let inactive = vec![friend("Doe", false)];
        assert_eq!(policy.route("hi", &user("Ana"), Some(&inactive)).await, Some(vec![]));
        assert_eq!(p.calls(), 0);
    }

    #[test]
    fn random_pick_is_bounded() {
        let r = roster();
        let active: Vec<&AiFriend> = r.iter().filter(|f| f.status).collect();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let names = random_pick("hello", &active, &mut rng);
            assert!((1..=3).contains(&names.len()));
        }
        let one = vec![&r[0]];
        assert_eq!(random_pick("hello", &one, &mut rng), vec!["Allen".to_string()]);
    }

    #[test]
    fn everyone_phrases_match_whole_words_only() {
        assert!(addresses_everyone("Hi everyone!"));
        assert!(addresses_everyone("what do you guys think?"));
        assert!(addresses_everyone("Y'all ready?"));
        assert!(addresses_everyone("I miss all of you"));
        assert!(!addresses_everyone("hey allen, how was your day?"));
        assert!(!addresses_everyone("did you allow it?"));
        assert!(!addresses_everyone("you allocate the budget"));
    }

    #[tokio::test]
    async fn greeting_a_friend_by_name_does_not_reach_everyone() {
        let (_, _, policy) = policy(vec![Reply::Json(json!({ "friends": ["Allen"] }))], vec![]);
        let names = policy
            .route("hey allen, how was your day?", &user("Ana"), Some(&roster()))
            .await
            .unwrap();
        assert_eq!(names, vec!["Allen".to_string()]);
    }

    #[tokio::test]
    async fn random_fallback_caps_a_crowded_message_at_three() {
        let crowd = vec![
            friend("Allen", true),
            friend("Tom", true),
            friend("John", true),
            friend("Mia", true),
            friend("Zoe", true),
        ];
        for _ in 0..20 {
            let (_, _, policy) = policy(vec![Reply::Fail], vec![Reply::Fail]);
            let names = policy
                .route("Allen, Tom, John and Mia: dinner?", &user("Ana"), Some(&crowd))
                .await
                .unwrap();
            assert_eq!(names.len(), 3, "got {:?}", names);
            assert!(names.iter().all(|n| ["Allen", "Tom", "John", "Mia"].contains(&n.as_str())));
        }
    }

    #[test]
    fn prompt_lists_only_active_friends() {
        let r = roster();
        let active: Vec<&AiFriend> = r.iter().filter(|f| f.status).collect();
        let prompt = build_prompt("hi", &user("Ana"), &active);
        assert!(prompt.user.contains("- Allen (Allen persona)"));
        assert!(!prompt.user.contains("Doe"));
        assert!(prompt.user.contains("User: Ana"));
        assert!(prompt.system.contains("multiple times"));
    }
}
