//! Built-in candidate sets for enumeration probes
//!
//! External wordlist files can be supplied through module options; these are
//! the fallbacks used when none is given.

/// Subdomain labels tried during wordlist-based discovery
pub fn subdomain_labels() -> Vec<&'static str> {
    vec![
        "www", "mail", "ftp", "webmail", "smtp", "pop", "ns1", "ns2", "ns3", "ns4", "webdisk",
        "ns", "test", "blog", "pop3", "dev", "www2", "admin", "forum", "news", "vpn", "mail2",
        "new", "mysql", "old", "www1", "beta", "exchange", "mx", "ftp2", "test2", "www3", "dns1",
        "api", "dns2", "web", "email", "git", "mobile", "demo", "secure", "vpn2", "server",
        "staging", "app", "cdn", "images", "static", "media", "docs", "help", "support", "portal",
        "shop", "store", "payment", "checkout", "cart", "my", "account", "profile", "user",
        "backup", "archive", "data", "files", "assets", "resources", "analytics", "stats",
        "reports", "logs", "api2", "monitor", "status", "labs", "alpha", "intranet", "internal",
        "gateway", "remote", "cloud", "auth", "sso", "login", "dashboard", "panel", "grafana",
        "jenkins", "gitlab", "jira", "wiki", "confluence",
    ]
}

/// Quick web-path list
pub fn web_paths_quick() -> Vec<&'static str> {
    vec![
        "admin", "login", "robots.txt", "sitemap.xml", ".git/HEAD", "api", "backup", "config",
        "uploads", "wp-admin", "wp-login.php", "phpmyadmin", ".env", "server-status",
    ]
}

/// Common web-path list
pub fn web_paths_common() -> Vec<&'static str> {
    let mut paths = web_paths_quick();
    paths.extend([
        "about", "contact", "dashboard", "static", "assets", "images", "img", "css", "js",
        "media", "files", "downloads", "docs", "documentation", "help", "support", "faq", "blog",
        "news", "test", "dev", "staging", "tmp", "temp", "old", "bak", "backup.zip", "db",
        "database", "sql", "logs", "log", "error_log", "access_log", "cgi-bin", "console",
        "portal", "panel", "manager", "administrator", "signin", "signup", "register", "account",
        "user", "users", "profile", "settings", "search", "api/v1", "api/v2", "health", "metrics",
        "status", "version", "info", "phpinfo.php", "index.bak", "web.config", ".htaccess",
        "crossdomain.xml", "favicon.ico",
    ]);
    paths
}

/// Extensive web-path list
pub fn web_paths_extensive() -> Vec<&'static str> {
    let mut paths = web_paths_common();
    paths.extend([
        "admin/login", "admin/dashboard", "admin.php", "admin.html", "administrator/index.php",
        "wp-content", "wp-includes", "wp-json", "xmlrpc.php", "vendor", "composer.json",
        "package.json", "yarn.lock", "Gemfile", "requirements.txt", "app", "application", "src",
        "public", "private", "secret", "hidden", "internal", "intranet", "jenkins", "jira",
        "gitlab", "grafana", "kibana", "prometheus", "swagger", "swagger-ui", "swagger.json",
        "openapi.json", "graphql", "graphiql", "debug", "trace", "actuator", "actuator/health",
        "actuator/env", "management", "manage", "setup", "install", "installer", "update",
        "upgrade", "maintenance", "readme.html", "README.md", "LICENSE", "CHANGELOG.md",
        ".git/config", ".svn/entries", ".DS_Store", "id_rsa", ".ssh", "etc/passwd",
    ]);
    paths
}

/// Site pages crawled for email addresses
pub fn email_crawl_pages() -> Vec<&'static str> {
    vec![
        "/", "/contact", "/about", "/team", "/staff", "/people", "/directory", "/support",
        "/help", "/careers", "/imprint", "/legal",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_grow_by_tier() {
        assert!(web_paths_quick().len() < web_paths_common().len());
        assert!(web_paths_common().len() < web_paths_extensive().len());
    }

    #[test]
    fn test_no_duplicate_subdomain_labels() {
        let labels = subdomain_labels();
        let mut deduped = labels.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(labels.len(), deduped.len());
    }
}
