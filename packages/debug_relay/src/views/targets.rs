use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, html};

use crate::session::SessionSnapshot;

/// Landing page: every known target, each linking into the debugger UI.
pub fn targets_page(targets: &[SessionSnapshot], now: DateTime<Utc>) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                title { "targetIds" }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
            }
            body {
                h1 { (targets.len()) " remote targets connected with the debug relay: " }
                ol {
                    @for target in targets {
                        li {
                            a href=(format!("/ui/index.html?targetId={}", urlencoding::encode(&target.target_id)))
                                target="_blank" {
                                (target.target_id)
                            }
                            " "
                            small { "(last seen " (super::ago(target.last_access, now)) ")" }
                        }
                    }
                }
            }
        }
    }
}
