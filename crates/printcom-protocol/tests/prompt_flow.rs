//! End-to-end properties of the prompt sub-protocol.

use std::sync::{Arc, Mutex};

use serde_json::json;

use printcom_protocol::{
    PromptNotification, PromptService, PromptSettings, PromptSink, SelectError,
};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<PromptNotification>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<PromptNotification> {
        self.events.lock().unwrap().clone()
    }
}

impl PromptSink for RecordingSink {
    fn send(&self, notification: PromptNotification) {
        self.events.lock().unwrap().push(notification);
    }
}

fn service() -> (PromptService, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let service = PromptService::new(PromptSettings::default().shared(), sink.clone());
    (service, sink)
}

fn feed(service: &PromptService, lines: &[&str]) {
    for line in lines {
        service.handle_action_line(line);
    }
}

#[test]
fn single_prompt_invariant_holds_across_arbitrary_event_orderings() {
    let (service, _sink) = service();
    // a hostile firmware event soup: duplicated begins, orphan choices,
    // shows without prompts, double ends
    feed(
        &service,
        &[
            "prompt_choice orphan",
            "prompt_show",
            "prompt_end",
            "prompt_begin one",
            "prompt_begin two",
            "prompt_choice a",
            "prompt_show",
            "prompt_begin usurper",
            "prompt_choice late",
            "prompt_show",
            "prompt_end",
            "prompt_end",
        ],
    );
    // converged back to the empty slot
    assert!(service.snapshot().is_none());
}

#[test]
fn late_begin_and_choice_cannot_touch_a_shown_prompt() {
    let (service, sink) = service();
    feed(
        &service,
        &[
            "prompt_begin one",
            "prompt_begin two",
            "prompt_choice a",
            "prompt_show",
            "prompt_begin usurper",
            "prompt_choice late",
        ],
    );
    assert_eq!(
        sink.events(),
        vec![PromptNotification::Show {
            text: "two".to_string(),
            choices: vec!["a".to_string()],
        }]
    );
    let snapshot = service.snapshot().unwrap();
    assert_eq!(snapshot.text, "two");
    assert_eq!(snapshot.choices, ["a"]);
}

#[test]
fn shown_prompt_reaches_presentation_with_ordered_choices() {
    let (service, sink) = service();
    feed(
        &service,
        &[
            "prompt_begin Proceed?",
            "prompt_choice Yes",
            "prompt_choice No",
            "prompt_show",
        ],
    );
    assert_eq!(
        sink.events(),
        vec![PromptNotification::Show {
            text: "Proceed?".to_string(),
            choices: vec!["Yes".to_string(), "No".to_string()],
        }]
    );
}

#[test]
fn selection_round_trip_emits_command_then_close() {
    let (service, sink) = service();
    feed(
        &service,
        &[
            "prompt_begin Proceed?",
            "prompt_choice Yes",
            "prompt_choice No",
            "prompt_show",
        ],
    );
    assert_eq!(service.select(&json!(1)).unwrap().command, "M876 S1");
    assert_eq!(
        sink.events().last(),
        Some(&PromptNotification::Close)
    );
    assert!(service.snapshot().is_none());
}

#[test]
fn out_of_band_indices_are_uniformly_rejected() {
    let (service, _sink) = service();
    feed(
        &service,
        &["prompt_begin Pick", "prompt_choice a", "prompt_choice b", "prompt_show"],
    );
    for bad in [-3_i64, -1, 2, 5, 1000] {
        assert!(matches!(
            service.select(&json!(bad)),
            Err(SelectError::ChoiceOutOfRange { .. })
        ));
    }
    // the prompt survived all rejections and index 0 still answers
    assert_eq!(service.select(&json!(0)).unwrap().command, "M876 S0");
}

#[test]
fn selecting_with_no_prompt_is_a_conflict() {
    let (service, _sink) = service();
    assert_eq!(service.select(&json!(0)), Err(SelectError::NoActivePrompt));
}

#[test]
fn concurrent_selections_race_for_one_answer() {
    let (service, _sink) = service();
    feed(
        &service,
        &["prompt_begin Pick", "prompt_choice a", "prompt_choice b", "prompt_show"],
    );
    let service = Arc::new(service);
    let mut handles = Vec::new();
    for index in 0..2_i64 {
        let service = Arc::clone(&service);
        handles.push(std::thread::spawn(move || service.select(&json!(index))));
    }
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    let wins = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(wins, 1, "exactly one racing selection must win: {results:?}");
    assert!(results
        .iter()
        .all(|result| matches!(result, Ok(_) | Err(SelectError::NoActivePrompt))));
}
