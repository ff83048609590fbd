//! 逻辑路径与联邦用户标识的工具函数。
//!
//! iRODS 逻辑路径始终以 `/` 分隔、以 `/` 开头（`/zone/home/user/...`）。
//! 本模块不触碰本地文件系统路径。

/// 规整逻辑路径：折叠重复分隔符、去掉尾部 `/`（根路径除外）。幂等。
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return String::from("/");
    }
    let mut cleaned = String::with_capacity(path.len());
    let mut last_was_separator = false;
    for ch in path.chars() {
        if ch == '/' {
            if !last_was_separator {
                cleaned.push('/');
            }
            last_was_separator = true;
        } else {
            cleaned.push(ch);
            last_was_separator = false;
        }
    }
    if cleaned.len() > 1 && cleaned.ends_with('/') {
        cleaned.pop();
    }
    cleaned
}

/// 拆分为（父路径，名字）。根路径拆出空名字。
pub fn split(path: &str) -> (String, String) {
    let cleaned = clean(path);
    if cleaned == "/" {
        return (String::from("/"), String::new());
    }
    match cleaned.rfind('/') {
        Some(0) => (String::from("/"), cleaned[1..].to_string()),
        Some(index) => (cleaned[..index].to_string(), cleaned[index + 1..].to_string()),
        None => (String::from("/"), cleaned),
    }
}

/// 取路径最后一段；根路径返回 `"/"`。
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}

/// 拼接父路径与名字。
pub fn join(base: &str, name: &str) -> String {
    if name.is_empty() {
        return clean(base);
    }
    let base = clean(base);
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// 父路径；根路径的父仍是根。
pub fn parent(path: &str) -> String {
    split(path).0
}

/// 是否为绝对逻辑路径。
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// 联邦用户标识 `name#zone` 的拆分结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub zone: String,
}

impl UserSpec {
    /// 按 `#` 拆分用户标识；缺省 zone 回退到给定的默认 zone。
    pub fn parse(spec: &str, default_zone: &str) -> Self {
        match spec.split_once('#') {
            Some((name, zone)) if !zone.is_empty() => Self {
                name: name.to_string(),
                zone: zone.to_string(),
            },
            Some((name, _)) => Self {
                name: name.to_string(),
                zone: default_zone.to_string(),
            },
            None => Self {
                name: spec.to_string(),
                zone: default_zone.to_string(),
            },
        }
    }

    /// 还原为 `name#zone` 形式。
    pub fn qualified(&self) -> String {
        format!("{}#{}", self.name, self.zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_is_idempotent() {
        for raw in ["/", "//", "/a//b/", "/a/b", "a/b/"] {
            let once = clean(raw);
            assert_eq!(clean(&once), once, "clean({raw:?}) 应幂等");
        }
        assert_eq!(clean("/tempZone/home/"), "/tempZone/home");
        assert_eq!(clean("/"), "/");
    }

    #[test]
    fn split_round_trips_join() {
        let (dir, name) = split("/tempZone/home/alice");
        assert_eq!(dir, "/tempZone/home");
        assert_eq!(name, "alice");
        assert_eq!(join(&dir, &name), "/tempZone/home/alice");

        assert_eq!(split("/"), (String::from("/"), String::new()));
        assert_eq!(split("/a"), (String::from("/"), String::from("a")));
    }

    #[test]
    fn user_spec_defaults_zone() {
        let spec = UserSpec::parse("alice#otherZone", "tempZone");
        assert_eq!(spec.name, "alice");
        assert_eq!(spec.zone, "otherZone");

        let spec = UserSpec::parse("bob", "tempZone");
        assert_eq!(spec.zone, "tempZone");
        assert_eq!(spec.qualified(), "bob#tempZone");
    }
}
