//! Robots.txt parser implementation
//!
//! Directives are collected with the robotstxt crate's parse callback and
//! reduced to the rule group that applies to the crawler's user agent.

use robotstxt::{parse_robotstxt, RobotsParseHandler};

/// Directives of one robots.txt that apply to a given user agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsDirectives {
    pub disallows: Vec<String>,
    pub allows: Vec<String>,
    /// Sitemap URLs apply to every agent
    pub sitemaps: Vec<String>,
}

impl RobotsDirectives {
    /// Parses robots.txt content for the given user agent
    ///
    /// Groups naming a token contained in `user_agent` (case-insensitive) take
    /// precedence; the `*` group is used only when no specific group matches.
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    /// * `user_agent` - The user agent string sent by the crawler
    ///
    /// # Returns
    ///
    /// The disallow/allow values of the selected groups and all sitemap URLs
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let mut collector = GroupCollector::default();
        parse_robotstxt(content, &mut collector);
        collector.finish();

        let agent = user_agent.to_lowercase();
        let specific: Vec<&RuleGroup> = collector
            .groups
            .iter()
            .filter(|g| g.matches_specific(&agent))
            .collect();
        let selected: Vec<&RuleGroup> = if specific.is_empty() {
            collector.groups.iter().filter(|g| g.is_wildcard()).collect()
        } else {
            specific
        };

        let mut directives = RobotsDirectives {
            sitemaps: collector.sitemaps,
            ..Default::default()
        };
        for group in selected {
            directives.disallows.extend(group.disallows.iter().cloned());
            directives.allows.extend(group.allows.iter().cloned());
        }
        directives
    }

    pub fn is_empty(&self) -> bool {
        self.disallows.is_empty() && self.allows.is_empty() && self.sitemaps.is_empty()
    }
}

#[derive(Debug, Default)]
struct RuleGroup {
    agents: Vec<String>,
    disallows: Vec<String>,
    allows: Vec<String>,
}

impl RuleGroup {
    fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|a| a == "*")
    }

    fn matches_specific(&self, agent: &str) -> bool {
        self.agents
            .iter()
            .any(|a| a != "*" && !a.is_empty() && agent.contains(a.as_str()))
    }
}

#[derive(Debug, Default)]
struct GroupCollector {
    groups: Vec<RuleGroup>,
    current: Option<RuleGroup>,
    // Consecutive user-agent lines share one group
    seen_rule: bool,
    sitemaps: Vec<String>,
}

impl GroupCollector {
    fn finish(&mut self) {
        if let Some(group) = self.current.take() {
            self.groups.push(group);
        }
    }

    fn current_group(&mut self) -> Option<&mut RuleGroup> {
        self.seen_rule = true;
        self.current.as_mut()
    }
}

impl RobotsParseHandler for GroupCollector {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        if self.seen_rule || self.current.is_none() {
            self.finish();
            self.current = Some(RuleGroup::default());
            self.seen_rule = false;
        }
        if let Some(group) = self.current.as_mut() {
            group.agents.push(user_agent.trim().to_lowercase());
        }
    }

    fn handle_allow(&mut self, _line_num: u32, value: &str) {
        let value = value.trim();
        if let Some(group) = self.current_group() {
            if !value.is_empty() {
                group.allows.push(value.to_string());
            }
        }
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        let value = value.trim();
        if let Some(group) = self.current_group() {
            if !value.is_empty() {
                group.disallows.push(value.to_string());
            }
        }
    }

    fn handle_sitemap(&mut self, _line_num: u32, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.sitemaps.push(value.to_string());
        }
    }

    fn handle_unknown_action(&mut self, _line_num: u32, _action: &str, _value: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wildcard_group() {
        let content = "User-agent: *\nDisallow: /admin\nAllow: /admin/public";
        let directives = RobotsDirectives::parse(content, "TestBot/1.0");
        assert_eq!(directives.disallows, vec!["/admin"]);
        assert_eq!(directives.allows, vec!["/admin/public"]);
    }

    #[test]
    fn test_specific_group_wins() {
        let content = "User-agent: testbot\nDisallow: /only-me\n\nUser-agent: *\nDisallow: /everyone";
        let directives = RobotsDirectives::parse(content, "TestBot/1.0");
        assert_eq!(directives.disallows, vec!["/only-me"]);

        let other = RobotsDirectives::parse(content, "OtherBot");
        assert_eq!(other.disallows, vec!["/everyone"]);
    }

    #[test]
    fn test_multiple_agents_share_group() {
        let content = "User-agent: BotA\nUser-agent: BotB\nDisallow: /shared";
        assert_eq!(
            RobotsDirectives::parse(content, "BotB").disallows,
            vec!["/shared"]
        );
        assert!(RobotsDirectives::parse(content, "BotC").disallows.is_empty());
    }

    #[test]
    fn test_empty_disallow_ignored() {
        let content = "User-agent: *\nDisallow:";
        assert!(RobotsDirectives::parse(content, "TestBot").is_empty());
    }

    #[test]
    fn test_sitemaps_collected() {
        let content = "Sitemap: http://h/sitemap.xml\nUser-agent: *\nDisallow: /x\nSitemap: http://h/news.xml";
        let directives = RobotsDirectives::parse(content, "TestBot");
        assert_eq!(
            directives.sitemaps,
            vec!["http://h/sitemap.xml", "http://h/news.xml"]
        );
    }

    #[test]
    fn test_garbage_content() {
        let directives = RobotsDirectives::parse("This is not valid robots.txt {{{", "TestBot");
        assert!(directives.is_empty());
    }
}
