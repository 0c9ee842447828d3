//! Robots.txt directive collection
//!
//! This module walks robots.txt content with the robotstxt crate's parse
//! handler and keeps every directive that hints at site structure.

use robotstxt::{parse_robotstxt, RobotsParseHandler};

/// Directives collected from a robots.txt file
///
/// Allow and Disallow paths are gathered from every user-agent group, since
/// they are used as discovery hints rather than as access rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsDirectives {
    pub user_agents: Vec<String>,
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    pub sitemaps: Vec<String>,
    /// Crawl-delay of the `*` group, or of the first group that sets one
    pub crawl_delay: Option<f64>,
}

impl RobotsDirectives {
    pub fn parse(content: &str) -> Self {
        let mut collector = DirectiveCollector::default();
        parse_robotstxt(content, &mut collector);

        let crawl_delay = collector.wildcard_delay.or(collector.first_delay);
        Self {
            user_agents: collector.user_agents,
            allow: collector.allow,
            disallow: collector.disallow,
            sitemaps: collector.sitemaps,
            crawl_delay,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.disallow.is_empty() && self.sitemaps.is_empty()
    }
}

#[derive(Default)]
struct DirectiveCollector {
    user_agents: Vec<String>,
    allow: Vec<String>,
    disallow: Vec<String>,
    sitemaps: Vec<String>,
    current_group: Vec<String>,
    group_has_rules: bool,
    wildcard_delay: Option<f64>,
    first_delay: Option<f64>,
}

impl RobotsParseHandler for DirectiveCollector {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        // A user-agent line after rules opens a new group
        if self.group_has_rules {
            self.current_group.clear();
            self.group_has_rules = false;
        }
        let agent = user_agent.trim().to_string();
        if !self.user_agents.contains(&agent) {
            self.user_agents.push(agent.clone());
        }
        self.current_group.push(agent);
    }

    fn handle_allow(&mut self, _line_num: u32, value: &str) {
        self.group_has_rules = true;
        push_path(&mut self.allow, value);
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.group_has_rules = true;
        push_path(&mut self.disallow, value);
    }

    fn handle_sitemap(&mut self, _line_num: u32, value: &str) {
        let value = value.trim();
        if !value.is_empty() && !self.sitemaps.iter().any(|s| s == value) {
            self.sitemaps.push(value.to_string());
        }
    }

    fn handle_unknown_action(&mut self, _line_num: u32, action: &str, value: &str) {
        if !action.trim().eq_ignore_ascii_case("crawl-delay") {
            return;
        }
        self.group_has_rules = true;
        let Ok(delay) = value.trim().parse::<f64>() else {
            return;
        };
        if self.current_group.iter().any(|ua| ua == "*") {
            self.wildcard_delay.get_or_insert(delay);
        }
        self.first_delay.get_or_insert(delay);
    }
}

fn push_path(paths: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !paths.iter().any(|p| p == value) {
        paths.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
User-agent: BadBot
Disallow: /

User-agent: *
Crawl-delay: 2.5
Allow: /public/
Disallow: /cgi-bin/
Disallow: /tmp/*.php
Disallow: /search

Sitemap: https://example.test/sitemap.xml
Sitemap: https://example.test/news-sitemap.xml
";

    #[test]
    fn test_collects_directives() {
        let robots = RobotsDirectives::parse(SAMPLE);
        assert_eq!(robots.user_agents, vec!["BadBot", "*"]);
        assert_eq!(robots.allow, vec!["/public/"]);
        assert!(robots.disallow.contains(&"/".to_string()));
        assert!(robots.disallow.contains(&"/cgi-bin/".to_string()));
        assert!(robots.disallow.contains(&"/search".to_string()));
        assert_eq!(robots.sitemaps.len(), 2);
        assert_eq!(robots.crawl_delay, Some(2.5));
    }

    #[test]
    fn test_wildcard_delay_preferred() {
        let robots = RobotsDirectives::parse(
            "User-agent: SlowBot\nCrawl-delay: 30\n\nUser-agent: *\nCrawl-delay: 5\n",
        );
        assert_eq!(robots.crawl_delay, Some(5.0));

        let robots = RobotsDirectives::parse("User-agent: SlowBot\nCrawl-delay: 30\n");
        assert_eq!(robots.crawl_delay, Some(30.0));
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(RobotsDirectives::parse("").is_empty());
        let robots = RobotsDirectives::parse("This is not valid robots.txt {{{");
        assert!(robots.is_empty());
    }
}
