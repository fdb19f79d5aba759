use serde::{Deserialize, Serialize};

/// Parsed User-Agent fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub os_version: String,
    pub desktop: bool,
    pub mobile: bool,
}

/// Substrings that mark a User-Agent as automated traffic. Checked
/// case-insensitively in addition to woothee's crawler category, which only
/// covers the majors.
const BOT_USER_AGENTS: [&str; 18] = [
    "bot",
    "spider",
    "crawler",
    "slurp",
    "archiver",
    "facebookexternalhit",
    "headlesschrome",
    "lighthouse",
    "pingdom",
    "uptimerobot",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "okhttp",
    "java/",
    "libwww-perl",
];

/// Classify a `User-Agent` header.
///
/// Returns `None` for an empty UA or one that matches the bot filter — the
/// caller drops the request without writing any records. A UA that woothee
/// cannot classify is still accepted; its fields stay empty and downstream
/// reports group it under "unknown".
pub fn parse_user_agent(user_agent: &str) -> Option<UserAgentInfo> {
    let user_agent = user_agent.trim();

    if user_agent.is_empty() || is_bot_user_agent(user_agent) {
        return None;
    }

    let result = match woothee::parser::Parser::new().parse(user_agent) {
        Some(result) => result,
        None => return Some(UserAgentInfo::default()),
    };

    if result.category == "crawler" {
        return None;
    }

    // woothee's device categories:
    //   "pc"                        → desktop
    //   "smartphone", "mobilephone" → mobile
    //   anything else (tablet, appliance, unknown) → neither
    let desktop = result.category == "pc";
    let mobile = matches!(result.category, "smartphone" | "mobilephone");

    Some(UserAgentInfo {
        browser: unknown_to_empty(result.name),
        browser_version: unknown_to_empty(&result.version),
        os: unknown_to_empty(result.os),
        os_version: unknown_to_empty(result.os_version.as_ref()),
        desktop,
        mobile,
    })
}

fn is_bot_user_agent(user_agent: &str) -> bool {
    let user_agent = user_agent.to_lowercase();
    BOT_USER_AGENTS
        .iter()
        .any(|token| user_agent.contains(token))
}

// woothee reports unknown fields as the sentinel "UNKNOWN" or as "".
fn unknown_to_empty(value: &str) -> String {
    if value == "UNKNOWN" {
        String::new()
    } else {
        value.to_string()
    }
}
