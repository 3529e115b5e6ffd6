use super::*;

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_empty_allow_list_admits_everyone() {
    assert!(check_allowed_sender("ou_anyone", &[]));
}

#[test]
fn test_wildcard_admits_everyone() {
    assert!(check_allowed_sender("ou_anyone", &list(&["ou_1", "*"])));
}

#[test]
fn test_listed_sender_admitted() {
    assert!(check_allowed_sender("ou_1", &list(&["ou_1", "ou_2"])));
    assert!(check_allowed_sender("ou_2", &list(&[" ou_2 "])));
}

#[test]
fn test_unlisted_sender_rejected() {
    assert!(!check_allowed_sender("ou_3", &list(&["ou_1", "ou_2"])));
    assert!(!check_allowed_sender("unknown", &list(&["ou_1"])));
}
