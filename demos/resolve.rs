use real_geo::{
    AddressSource, IpExtractor, ResolvedAddress, SubnetClassifier, resolve_client_address,
};
use std::collections::HashMap;

fn main() {
    println!("=== Client Address Resolution Examples ===\n");

    // Example 1: Rightmost public hop wins
    example_1_rightmost_public();

    // Example 2: Private hops are skipped
    example_2_private_hops();

    // Example 3: X-Real-IP as second choice
    example_3_real_ip();

    // Example 4: Fallback to the connection peer
    example_4_fallback();

    // Example 5: Custom range table
    example_5_custom_table();

    println!("=== All examples completed! ===");
}

fn describe(resolved: &ResolvedAddress) -> String {
    match &resolved.source {
        AddressSource::Header { name, position } => format!("forwarded {name}[{position}]"),
        AddressSource::Connection => "connection peer".to_string(),
    }
}

fn example_1_rightmost_public() {
    println!("Example 1: X-Forwarded-For with two public hops");

    let mut headers = HashMap::new();
    headers.insert(
        "x-forwarded-for".to_string(),
        "203.0.113.5, 198.51.100.9".to_string(),
    );

    let resolved = IpExtractor::default().resolve(&headers, "10.0.0.2:443");
    println!("Resolved {resolved} from {}", describe(&resolved));
    println!();
}

fn example_2_private_hops() {
    println!("Example 2: Private hops are skipped");

    let mut headers = HashMap::new();
    headers.insert(
        "x-forwarded-for".to_string(),
        "8.8.8.8, 192.168.1.1".to_string(),
    );

    let ip = resolve_client_address(&headers, "10.0.0.2:443");
    println!("Resolved: {ip}");
    println!();
}

fn example_3_real_ip() {
    println!("Example 3: X-Real-IP when X-Forwarded-For has nothing public");

    let mut headers = HashMap::new();
    headers.insert(
        "x-forwarded-for".to_string(),
        "10.0.0.1, garbage".to_string(),
    );
    headers.insert("x-real-ip".to_string(), "198.51.100.20".to_string());

    let resolved = IpExtractor::default().resolve(&headers, "10.0.0.2:443");
    println!("Resolved {resolved} from {}", describe(&resolved));
    println!();
}

fn example_4_fallback() {
    println!("Example 4: Fallback to remote address");

    let headers = HashMap::new();
    let extractor = IpExtractor::default();
    let resolved = extractor.resolve(&headers, "198.51.100.7:54321");
    println!("Came through a proxy: {}", resolved.is_forwarded());
    println!("Resolved {resolved} from {}", describe(&resolved));
    println!();
}

fn example_5_custom_table() {
    println!("Example 5: Empty range table trusts private hops");

    let mut headers = HashMap::new();
    headers.insert(
        "x-forwarded-for".to_string(),
        "203.0.113.5, 10.0.0.1".to_string(),
    );

    let default_table = IpExtractor::default();
    for range in default_table.classifier().ranges() {
        println!("  reserved {} - {}", range.start(), range.end());
    }
    let empty_classifier = SubnetClassifier::new(Vec::new());
    let empty_table = IpExtractor::new().with_classifier(empty_classifier);

    let with_default = default_table.resolve(&headers, "10.0.0.2:443");
    let with_empty = empty_table.resolve(&headers, "10.0.0.2:443");
    println!("Default table: {with_default}");
    println!("Empty table:   {with_empty}");
    println!();
}
