//! 通配模式匹配：glob 到 LIKE 的服务端预筛，加本地精筛。
//!
//! LIKE 翻译是放大的（匹配集是 glob 的超集）：`[…]` 字符类直接翻成
//! `%`，再用编译后的 glob 匹配器在本地收窄。

use crate::facade::Client;
use crate::query::builder::Condition;
use crate::walk::WalkDecision;
use rods_core::api::columns::{COL_COLL_NAME, COL_COLL_PARENT_NAME, COL_DATA_NAME};
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::path;

/// 把单个 glob 组件翻译为 LIKE 模式。
///
/// `*`→`%`，`?`→`_`，`[…]`→`%`（留给本地精筛），字面 `%`/`_` 加反斜杠
/// 转义，`\x` 转义还原为字面 `x`。
pub fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(literal) = chars.next() {
                    push_literal(&mut like, literal);
                }
            }
            '*' => like.push('%'),
            '?' => like.push('_'),
            '[' => {
                // 跳过整个字符类；由本地精筛兜底。
                let mut depth_escaped = false;
                for inner in chars.by_ref() {
                    if depth_escaped {
                        depth_escaped = false;
                        continue;
                    }
                    match inner {
                        '\\' => depth_escaped = true,
                        ']' => break,
                        _ => {}
                    }
                }
                like.push('%');
            }
            other => push_literal(&mut like, other),
        }
    }
    like
}

fn push_literal(like: &mut String, ch: char) {
    if ch == '%' || ch == '_' {
        like.push('\\');
    }
    like.push(ch);
}

/// 组件是否含未转义的通配符。
fn has_wildcard(component: &str) -> bool {
    let mut escaped = false;
    for ch in component.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// 去掉转义反斜杠，得到字面名字。
fn unescape(component: &str) -> String {
    let mut name = String::with_capacity(component.len());
    let mut escaped = false;
    for ch in component.chars() {
        if escaped {
            name.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            name.push(ch);
        }
    }
    name
}

fn compile_matcher(component: &str) -> Result<globset::GlobMatcher, RodsError> {
    globset::Glob::new(component)
        .map(|glob| glob.compile_matcher())
        .map_err(|_| RodsError::Parse {
            value: component.to_string(),
            target: "glob pattern",
        })
}

struct GlobState {
    client: Client,
    root: String,
    absolute: bool,
    stopped: bool,
}

impl GlobState {
    /// 把命中路径按模式的绝对/相对属性换算后上报。
    fn report(&mut self, visitor: &mut dyn FnMut(&str) -> WalkDecision, matched: &str) {
        let reported: String = if self.absolute {
            matched.to_string()
        } else if matched == self.root {
            ".".to_string()
        } else {
            matched
                .strip_prefix(&format!("{}/", self.root))
                .unwrap_or(matched)
                .to_string()
        };
        if visitor(&reported) == WalkDecision::SkipAll {
            self.stopped = true;
        }
    }
}

/// 在目录层级上展开 glob 模式，逐个上报命中路径。
///
/// 绝对模式上报绝对路径，相对模式上报相对遍历根的路径；命中等于根时
/// 上报 `"."`。回调返回 [`WalkDecision::SkipAll`] 时立即终止。
pub async fn glob(
    ctx: &CallContext,
    client: &Client,
    root: &str,
    pattern: &str,
    visitor: &mut dyn FnMut(&str) -> WalkDecision,
) -> Result<(), RodsError> {
    let absolute = path::is_absolute(pattern);
    let root = path::clean(root);
    let base = if absolute {
        String::from("/")
    } else {
        root.clone()
    };
    let components: Vec<String> = pattern
        .split('/')
        .filter(|component| !component.is_empty())
        .map(str::to_string)
        .collect();
    let mut state = GlobState {
        client: client.clone(),
        root,
        absolute,
        stopped: false,
    };
    expand(ctx, &mut state, base, &components, visitor).await
}

/// 收集版入口：把全部命中路径收进向量。
pub async fn glob_collect(
    ctx: &CallContext,
    client: &Client,
    root: &str,
    pattern: &str,
) -> Result<Vec<String>, RodsError> {
    let mut matches = Vec::new();
    glob(ctx, client, root, pattern, &mut |matched| {
        matches.push(matched.to_string());
        WalkDecision::Continue
    })
    .await?;
    Ok(matches)
}

fn expand<'a>(
    ctx: &'a CallContext,
    state: &'a mut GlobState,
    base: String,
    components: &'a [String],
    visitor: &'a mut dyn FnMut(&str) -> WalkDecision,
) -> futures::future::LocalBoxFuture<'a, Result<(), RodsError>> {
    Box::pin(async move {
        if state.stopped {
            return Ok(());
        }
        ctx.ensure_active()?;

        // 吃掉前缀里的静态组件。
        let mut base = base;
        let mut rest = components;
        while let Some(component) = rest.first() {
            if has_wildcard(component) {
                break;
            }
            base = path::join(&base, &unescape(component));
            rest = &rest[1..];
        }

        let Some(component) = rest.first() else {
            // 纯静态模式：存在才算命中。
            if state.client.exists_data_object(ctx, &base).await?
                || state.client.exists_collection(ctx, &base).await?
            {
                state.report(visitor, &base);
            }
            return Ok(());
        };

        let matcher = compile_matcher(component)?;
        let like = glob_to_like(component);
        let is_last = rest.len() == 1;

        if is_last {
            let objects = state
                .client
                .list_data_objects_where(
                    ctx,
                    [
                        Condition::equal(COL_COLL_NAME, &base),
                        Condition::like(COL_DATA_NAME, &like),
                    ],
                )
                .await?;
            for object in objects {
                if state.stopped {
                    return Ok(());
                }
                if matcher.is_match(object.name()) {
                    let matched = object.path.clone();
                    state.report(visitor, &matched);
                }
            }
            return Ok(());
        }

        let like_path = format!("{}/{}", if base == "/" { "" } else { base.as_str() }, like);
        let collections = state
            .client
            .list_sub_collections_where(
                ctx,
                [
                    Condition::equal(COL_COLL_PARENT_NAME, &base),
                    Condition::like(COL_COLL_NAME, &like_path),
                ],
            )
            .await?;
        for collection in collections {
            if state.stopped {
                return Ok(());
            }
            if matcher.is_match(collection.name()) {
                expand(ctx, &mut *state, collection.path.clone(), &rest[1..], &mut *visitor)
                    .await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn like_translation_fixed_points() {
        assert_eq!(glob_to_like("file?.txt"), "file_.txt");
        assert_eq!(glob_to_like("100%"), "100\\%");
        assert_eq!(glob_to_like("\\*"), "*");
        assert_eq!(glob_to_like("*.dat"), "%.dat");
        assert_eq!(glob_to_like("a[bc]d"), "a%d");
        assert_eq!(glob_to_like("under_score"), "under\\_score");
    }

    #[test]
    fn wildcard_detection_honors_escapes() {
        assert!(has_wildcard("a*b"));
        assert!(has_wildcard("a[0-9]"));
        assert!(!has_wildcard("\\*literal"));
        assert!(!has_wildcard("plain"));
        assert_eq!(unescape("\\*literal"), "*literal");
    }

    /// 本地 LIKE 求值器，仅用于性质测试。
    fn like_matches(pattern: &str, name: &str) -> bool {
        fn inner(p: &[char], n: &[char]) -> bool {
            match p.split_first() {
                None => n.is_empty(),
                Some((&'%', rest)) => (0..=n.len()).any(|skip| inner(rest, &n[skip..])),
                Some((&'_', rest)) => !n.is_empty() && inner(rest, &n[1..]),
                Some((&'\\', rest)) => match rest.split_first() {
                    Some((literal, tail)) => {
                        n.first() == Some(literal) && inner(tail, &n[1..])
                    }
                    None => n.is_empty(),
                },
                Some((ch, rest)) => n.first() == Some(ch) && inner(rest, &n[1..]),
            }
        }
        inner(
            &pattern.chars().collect::<Vec<_>>(),
            &name.chars().collect::<Vec<_>>(),
        )
    }

    proptest! {
        /// glob 命中的名字必然命中翻译出的 LIKE 模式（LIKE 是超集）。
        #[test]
        fn like_is_superset_of_glob(
            pattern in "[a-c*?%_.\\[\\]-]{0,8}",
            name in "[a-c%_.-]{0,8}",
        ) {
            let Ok(glob) = globset::Glob::new(&pattern) else {
                return Ok(());
            };
            let matcher = glob.compile_matcher();
            if matcher.is_match(&name) {
                let like = glob_to_like(&pattern);
                prop_assert!(
                    like_matches(&like, &name),
                    "glob {pattern:?} 命中 {name:?}，但 LIKE {like:?} 未命中"
                );
            }
        }
    }
}
