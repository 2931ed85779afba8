/// Turns a subject pattern into a token usable inside a durable consumer
/// name: dots become dashes, wildcard characters are stripped.
pub fn sanitize_subject(subject: &str) -> String {
    subject
        .replace('.', "-")
        .chars()
        .filter(|c| !matches!(c, '*' | '>'))
        .collect()
}

/// Default durable consumer name for a subscription:
/// `{consumer_name}-{stream_name}-{sanitized subject}`.
///
/// The durable name is the broker-side identity of the consumer group;
/// every replica of the same service derives the same name and shares
/// the cursor.
pub fn durable_name(consumer_name: &str, stream_name: &str, subject: &str) -> String {
    format!(
        "{}-{}-{}",
        consumer_name,
        stream_name,
        sanitize_subject(subject)
    )
}
