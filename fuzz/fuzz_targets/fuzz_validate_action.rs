#![no_main]
use keba_control::action::{Action, ActionKind};
use keba_control::validation::validate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the action, the rest is the JSON body
    let Some((selector, body)) = data.split_first() else {
        return;
    };
    let kind = ActionKind::ALL[usize::from(*selector) % ActionKind::ALL.len()];
    let Ok(serde_json::Value::Object(fields)) = serde_json::from_slice::<serde_json::Value>(body) else {
        return;
    };

    // Anything validation accepts must build a typed action
    if let Ok(validated) = validate(kind, &fields) {
        assert!(Action::from_fields(&validated).is_ok());
    }
});
