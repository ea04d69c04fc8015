use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Object category of a tmsh declaration.
///
/// Declaration order is the fixed output order of every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    VirtualServers,
    Pools,
    Monitors,
    Profiles,
    #[serde(rename = "irules")]
    IRules,
    Policies,
    Certificates,
    DataGroups,
    Nodes,
    /// Declarations outside the known categories, keyed by full header.
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::VirtualServers,
        Category::Pools,
        Category::Monitors,
        Category::Profiles,
        Category::IRules,
        Category::Policies,
        Category::Certificates,
        Category::DataGroups,
        Category::Nodes,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::VirtualServers => "virtual_servers",
            Category::Pools => "pools",
            Category::Monitors => "monitors",
            Category::Profiles => "profiles",
            Category::IRules => "irules",
            Category::Policies => "policies",
            Category::Certificates => "certificates",
            Category::DataGroups => "data_groups",
            Category::Nodes => "nodes",
            Category::Other => "other",
        }
    }

    /// Bodies of these categories are kept verbatim instead of field parsed.
    pub fn is_opaque(self) -> bool {
        matches!(self, Category::IRules | Category::Other)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        let category = match normalized.as_str() {
            "virtual_servers" | "virtuals" | "virtual" | "vs" => Category::VirtualServers,
            "pools" | "pool" => Category::Pools,
            "monitors" | "monitor" => Category::Monitors,
            "profiles" | "profile" => Category::Profiles,
            "irules" | "irule" | "rules" | "rule" => Category::IRules,
            "policies" | "policy" => Category::Policies,
            "certificates" | "certificate" | "certs" | "cert" => Category::Certificates,
            "data_groups" | "data_group" | "datagroups" => Category::DataGroups,
            "nodes" | "node" => Category::Nodes,
            "other" => Category::Other,
            _ => return Err(format!("unknown category '{raw}'")),
        };
        Ok(category)
    }
}

/// Category, subtype and object name derived from a declaration header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMatch {
    pub category: Category,
    pub kind: Option<String>,
    pub name: String,
}

/// Map declaration tokens to an object category.
///
/// Unknown shapes fall into [`Category::Other`] keyed by the whole header.
pub fn classify_header(header: &[String]) -> HeaderMatch {
    let tokens: Vec<&str> = header.iter().map(String::as_str).collect();
    let matched = match tokens.as_slice() {
        ["ltm", "virtual", name] => Some((Category::VirtualServers, None, *name)),
        ["ltm", "pool", name] => Some((Category::Pools, None, *name)),
        ["ltm", "monitor", kind, name] => Some((Category::Monitors, Some(*kind), *name)),
        ["ltm", "profile", kind, name] => Some((Category::Profiles, Some(*kind), *name)),
        ["ltm", "persistence", kind, name] => Some((Category::Profiles, Some(*kind), *name)),
        ["ltm", "rule", name] => Some((Category::IRules, None, *name)),
        ["ltm", "policy", name] => Some((Category::Policies, None, *name)),
        ["sys", "file", kind @ ("ssl-cert" | "ssl-key"), name] => {
            Some((Category::Certificates, Some(*kind), *name))
        }
        ["sys", "crypto", kind @ ("cert" | "key"), name] => {
            Some((Category::Certificates, Some(*kind), *name))
        }
        ["ltm", "data-group", kind, name] => Some((Category::DataGroups, Some(*kind), *name)),
        ["ltm", "node", name] => Some((Category::Nodes, None, *name)),
        _ => None,
    };

    match matched {
        Some((category, kind, name)) => HeaderMatch {
            category,
            kind: kind.map(ToString::to_string),
            name: name.to_string(),
        },
        None => HeaderMatch {
            category: Category::Other,
            kind: None,
            name: header.join(" "),
        },
    }
}

/// Profile subtypes carrying TLS settings.
pub fn is_ssl_kind(kind: Option<&str>) -> bool {
    matches!(kind, Some("client-ssl" | "server-ssl"))
}

#[cfg(test)]
mod tests {
    use super::{classify_header, Category};

    fn header(text: &str) -> Vec<String> {
        text.split_whitespace().map(ToString::to_string).collect()
    }

    #[test]
    fn maps_known_headers() {
        let m = classify_header(&header("ltm monitor http /Common/http-health"));
        assert_eq!(m.category, Category::Monitors);
        assert_eq!(m.kind.as_deref(), Some("http"));
        assert_eq!(m.name, "/Common/http-health");

        let m = classify_header(&header("ltm persistence cookie /Common/cookie-app"));
        assert_eq!(m.category, Category::Profiles);

        let m = classify_header(&header("sys file ssl-cert /Common/api.crt"));
        assert_eq!(m.category, Category::Certificates);
        assert_eq!(m.kind.as_deref(), Some("ssl-cert"));
    }

    #[test]
    fn unknown_headers_are_other_keyed_by_full_text() {
        let m = classify_header(&header("net vlan /Common/external"));
        assert_eq!(m.category, Category::Other);
        assert_eq!(m.name, "net vlan /Common/external");
        assert_eq!(m.kind, None);

        let m = classify_header(&header("ltm pool"));
        assert_eq!(m.category, Category::Other);
    }

    #[test]
    fn category_order_is_fixed() {
        let mut shuffled = vec![Category::Other, Category::Nodes, Category::VirtualServers];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Category::VirtualServers, Category::Nodes, Category::Other]
        );
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("virtual-servers".parse::<Category>(), Ok(Category::VirtualServers));
        assert_eq!("iRules".parse::<Category>(), Ok(Category::IRules));
        assert!("vlans".parse::<Category>().is_err());
    }
}
