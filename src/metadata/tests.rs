use super::*;
use std::path::PathBuf;

const BASE_URL: &str = "https://satoshi.nakamotoinstitute.org";

fn resolver() -> MetadataResolver {
    MetadataResolver::new(BASE_URL)
}

#[test]
fn email_filename_pattern() {
    let path = PathBuf::from("nakamotoinstitute_files/emails/email_003_On_Money_Supply.html");
    let metadata = resolver().resolve(&path, "");

    assert_eq!(metadata.content_type, ContentType::Email);
    assert_eq!(metadata.collection, "emails");
    assert_eq!(metadata.filename, "email_003_On_Money_Supply");
    assert_eq!(metadata.sequence_number.as_deref(), Some("003"));
    assert_eq!(metadata.title.as_deref(), Some("On Money Supply"));
}

#[test]
fn post_and_quote_collections_from_path() {
    let post = resolver().resolve(&PathBuf::from("files/posts/post_001_Hello.html"), "");
    assert_eq!(post.content_type, ContentType::Post);
    assert_eq!(post.collection, "posts");

    let quote = resolver().resolve(&PathBuf::from("files/quotes/quote_010_Trust.html"), "");
    assert_eq!(quote.content_type, ContentType::Quote);
    assert_eq!(quote.collection, "quotes");
}

#[test]
fn unrecognized_path_is_main() {
    let metadata = resolver().resolve(&PathBuf::from("files/emails_main.html"), "");
    assert_eq!(metadata.content_type, ContentType::Main);
    assert_eq!(metadata.collection, "main");
    assert_eq!(metadata.sequence_number, None);
    assert_eq!(metadata.title, None);
}

#[test]
fn date_line_with_pipe_marker() {
    let text = "Subject line\nDate: | 2009-01-08 02:15:32 UTC\nbody";
    let metadata = resolver().resolve(&PathBuf::from("emails/email_001_Test.html"), text);

    assert_eq!(metadata.date.as_deref(), Some("2009-01-08 02:15:32 UTC"));
}

#[test]
fn date_scan_stops_at_first_match() {
    let text = "Date: | 2009-01-08 02:15:32 UTC\nDate: | 2010-12-12 18:22:33 UTC";
    let metadata = resolver().resolve(&PathBuf::from("emails/email_001_Test.html"), text);

    assert_eq!(metadata.date.as_deref(), Some("2009-01-08 02:15:32 UTC"));
}

#[test]
fn source_url_requires_canonical_prefix() {
    let text = "Source: https://satoshi.nakamotoinstitute.org/emails/cryptography/1/ extra";
    let metadata = resolver().resolve(&PathBuf::from("emails/email_001_Test.html"), text);
    assert_eq!(
        metadata.source_url.as_deref(),
        Some("https://satoshi.nakamotoinstitute.org/emails/cryptography/1/")
    );

    let foreign = "Source: https://example.com/not-the-archive/";
    let metadata = resolver().resolve(&PathBuf::from("emails/email_001_Test.html"), foreign);
    assert_eq!(metadata.source_url, None);
}

#[test]
fn missing_patterns_fail_by_omission() {
    let metadata = resolver().resolve(&PathBuf::from("posts/announcement.html"), "plain text");

    assert_eq!(metadata.sequence_number, None);
    assert_eq!(metadata.title, None);
    assert_eq!(metadata.source_url, None);
    assert_eq!(metadata.date, None);
}

#[test]
fn resolve_is_deterministic() {
    let path = PathBuf::from("emails/email_042_Double_Spending.html");
    let text = "Source: https://satoshi.nakamotoinstitute.org/emails/42/\nDate: | 2010-02-14 12:00:00 UTC";

    let first = resolver().resolve(&path, text);
    let second = resolver().resolve(&path, text);
    assert_eq!(first, second);
}

#[test]
fn key_values_include_only_present_fields() {
    let metadata = resolver().resolve(&PathBuf::from("files/quotes/freeform.html"), "");
    let keys: Vec<&str> = metadata.to_key_values().into_iter().map(|(k, _)| k).collect();

    assert_eq!(
        keys,
        vec!["collection", "content_type", "filename", "source_file"]
    );
}
