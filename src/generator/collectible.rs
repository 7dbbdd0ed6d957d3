//! Generation strategy for the "collectible-campaign" template.
//!
//! Every user-supplied string interpolated into generated source goes through
//! [`js_str`], which JSON-encodes it into a quoted literal. The only raw-HTML
//! sink is the rich-text `dangerouslySetInnerHTML` block, and even there the
//! HTML payload itself is carried inside an escaped string literal.

use serde_json::json;

use super::{GeneratedProject, SiteBundle};
use crate::models::{CardManifestBody, ContentBody};

/// Template name this strategy handles.
pub const COLLECTIBLE_TEMPLATE: &str = "collectible-campaign";

/// npm package providing the end-user auth provider for generated sites.
const AUTH_SDK_PACKAGE: &str = "@campaign-auth/nextjs";

/// Encode a user string as a JavaScript string literal (quotes included).
fn js_str(s: &str) -> String {
    // JSON string encoding is a valid JS string literal; quote and backslash
    // characters in the input cannot terminate the literal early.
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

/// Build the full file map for a site bundle.
pub fn generate(bundle: &SiteBundle) -> GeneratedProject {
    let mut project = GeneratedProject::default();

    project.insert_text("package.json", package_json(bundle));
    project.insert_text("next.config.mjs", next_config());
    project.insert_text("app/globals.css", globals_css());
    project.insert_text("app/layout.tsx", layout_tsx(bundle));
    project.insert_text("app/page.tsx", page_tsx(bundle));
    project.insert_text(".gitignore", gitignore());
    project.insert_text(".env.example", env_example(bundle));
    project.insert_text("README.md", readme(bundle));

    project
}

fn package_json(bundle: &SiteBundle) -> String {
    let mut dependencies = serde_json::Map::new();
    dependencies.insert("next".to_string(), json!("14.2.5"));
    dependencies.insert("react".to_string(), json!("18.3.1"));
    dependencies.insert("react-dom".to_string(), json!("18.3.1"));
    if bundle.site.user_management {
        dependencies.insert(AUTH_SDK_PACKAGE.to_string(), json!("^2.0.0"));
    }

    let manifest = json!({
        "name": bundle.site.slug,
        "version": "0.1.0",
        "private": true,
        "scripts": {
            "dev": "next dev",
            "build": "next build",
            "start": "next start"
        },
        "dependencies": dependencies
    });

    serde_json::to_string_pretty(&manifest).unwrap_or_else(|_| "{}".to_string())
}

fn next_config() -> String {
    concat!(
        "/** @type {import('next').NextConfig} */\n",
        "const nextConfig = {\n",
        "  output: 'export',\n",
        "  images: { unoptimized: true },\n",
        "};\n",
        "\n",
        "export default nextConfig;\n",
    )
    .to_string()
}

fn globals_css() -> String {
    concat!(
        ":root { color-scheme: dark; }\n",
        "body { margin: 0; font-family: system-ui, sans-serif; background: #0b0b0f; color: #f4f4f5; }\n",
        "main { max-width: 720px; margin: 0 auto; padding: 2rem 1rem; }\n",
        ".hero { text-align: center; padding: 3rem 0; }\n",
        ".hero-media { max-width: 100%; border-radius: 12px; }\n",
        ".cta { display: inline-block; margin-top: 1rem; padding: 0.75rem 2rem; border-radius: 999px; background: #f4f4f5; color: #0b0b0f; text-decoration: none; }\n",
        ".card-stage { perspective: 1200px; display: flex; justify-content: center; padding: 2rem 0; }\n",
        ".card { position: relative; transform-style: preserve-3d; transition: transform 0.8s; }\n",
        ".card:hover { transform: rotateY(180deg); }\n",
        ".card-face { position: absolute; inset: 0; backface-visibility: hidden; border-radius: 12px; overflow: hidden; }\n",
        ".card-back { transform: rotateY(180deg); }\n",
        ".card.foil .card-face { box-shadow: 0 0 24px rgba(212, 175, 55, 0.6); }\n",
        ".card.holo .card-face::after { content: ''; position: absolute; inset: 0; background: linear-gradient(120deg, transparent 30%, rgba(255,255,255,0.35) 50%, transparent 70%); }\n",
        ".signup { text-align: center; padding: 2rem 0; }\n",
        ".signup-button { display: inline-block; padding: 0.75rem 2rem; border-radius: 8px; background: #6d28d9; color: #fff; text-decoration: none; }\n",
    )
    .to_string()
}

fn layout_tsx(bundle: &SiteBundle) -> String {
    let mut out = String::new();
    out.push_str("import './globals.css';\n");
    if bundle.site.user_management {
        out.push_str(&format!(
            "import {{ AuthProvider }} from '{}';\n",
            AUTH_SDK_PACKAGE
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "export const metadata = {{\n  title: {},\n}};\n\n",
        js_str(&bundle.site.display_name)
    ));
    out.push_str("export default function RootLayout({ children }: { children: React.ReactNode }) {\n");
    out.push_str("  return (\n");
    out.push_str("    <html lang=\"en\">\n");
    if bundle.site.user_management {
        out.push_str("      <body>\n");
        out.push_str("        <AuthProvider publishableKey={process.env.NEXT_PUBLIC_AUTH_PUBLISHABLE_KEY}>\n");
        out.push_str("          {children}\n");
        out.push_str("        </AuthProvider>\n");
        out.push_str("      </body>\n");
    } else {
        out.push_str("      <body>{children}</body>\n");
    }
    out.push_str("    </html>\n");
    out.push_str("  );\n");
    out.push_str("}\n");
    out
}

fn page_tsx(bundle: &SiteBundle) -> String {
    let mut sections = String::new();

    for item in bundle.section("hero") {
        if let Some(block) = render_block(&item.body, "      ") {
            sections.push_str("      <section className=\"hero\">\n");
            sections.push_str(&block);
            sections.push_str("      </section>\n");
        }
    }

    let description: Vec<String> = bundle
        .section("description")
        .iter()
        .filter_map(|item| render_block(&item.body, "        "))
        .collect();
    if !description.is_empty() {
        sections.push_str("      <section className=\"description\">\n");
        for block in description {
            sections.push_str(&block);
        }
        sections.push_str("      </section>\n");
    }

    if let Some(card) = &bundle.active_card {
        sections.push_str(&card_section(&card.manifest));
    }

    for item in bundle.section("signup") {
        if let ContentBody::Signup {
            headline,
            button_label,
        } = &item.body
        {
            sections.push_str("      <section className=\"signup\">\n");
            if let Some(headline) = headline {
                sections.push_str(&format!("        <h2>{{{}}}</h2>\n", js_str(headline)));
            }
            let label = button_label.as_deref().unwrap_or("Sign up");
            sections.push_str(&format!(
                "        <a className=\"signup-button\" href=\"/signup\">{{{}}}</a>\n",
                js_str(label)
            ));
            sections.push_str("      </section>\n");
        }
    }

    format!(
        "export default function Page() {{\n  return (\n    <main>\n{}    </main>\n  );\n}}\n",
        sections
    )
}

/// Render one content block as JSX, or None for bodies this page ignores.
fn render_block(body: &ContentBody, indent: &str) -> Option<String> {
    match body {
        ContentBody::Hero {
            title,
            subtitle,
            media_url,
            media_kind,
            cta_label,
            cta_href,
        } => {
            let mut out = String::new();
            if let Some(url) = media_url {
                if media_kind.as_deref() == Some("video") {
                    out.push_str(&format!(
                        "{}<video className=\"hero-media\" src={{{}}} autoPlay muted loop playsInline />\n",
                        indent,
                        js_str(url)
                    ));
                } else {
                    out.push_str(&format!(
                        "{}<img className=\"hero-media\" src={{{}}} alt=\"\" />\n",
                        indent,
                        js_str(url)
                    ));
                }
            }
            out.push_str(&format!("{}<h1>{{{}}}</h1>\n", indent, js_str(title)));
            if let Some(subtitle) = subtitle {
                out.push_str(&format!("{}<p>{{{}}}</p>\n", indent, js_str(subtitle)));
            }
            if let (Some(label), Some(href)) = (cta_label, cta_href) {
                out.push_str(&format!(
                    "{}<a className=\"cta\" href={{{}}}>{{{}}}</a>\n",
                    indent,
                    js_str(href),
                    js_str(label)
                ));
            }
            Some(out)
        }
        ContentBody::Text { text } => Some(format!("{}<p>{{{}}}</p>\n", indent, js_str(text))),
        ContentBody::RichText { html } => Some(format!(
            "{}<div dangerouslySetInnerHTML={{{{ __html: {} }}}} />\n",
            indent,
            js_str(html)
        )),
        ContentBody::Image { url, alt } => Some(format!(
            "{}<img src={{{}}} alt={{{}}} />\n",
            indent,
            js_str(url),
            js_str(alt.as_deref().unwrap_or(""))
        )),
        ContentBody::Video { url, poster_url } => {
            let poster = poster_url
                .as_ref()
                .map(|p| format!(" poster={{{}}}", js_str(p)))
                .unwrap_or_default();
            Some(format!(
                "{}<video src={{{}}}{} controls />\n",
                indent,
                js_str(url),
                poster
            ))
        }
        // Card rendering is driven by the active manifest, signup by its own
        // section pass.
        ContentBody::CardManifest { .. } | ContentBody::Signup { .. } => None,
    }
}

fn card_section(manifest: &CardManifestBody) -> String {
    let mut classes = String::from("card");
    if manifest.foil {
        classes.push_str(" foil");
    }
    if manifest.holographic {
        classes.push_str(" holo");
    }

    let mut out = String::new();
    out.push_str("      <section className=\"card-stage\">\n");
    out.push_str(&format!(
        "        <div className=\"{}\" style={{{{ width: {}, height: {} }}}}>\n",
        classes,
        format_dimension(manifest.width_mm),
        format_dimension(manifest.height_mm)
    ));
    out.push_str("          <div className=\"card-face card-front\">\n");
    if let Some(video) = &manifest.front_video_url {
        out.push_str(&format!(
            "            <video src={{{}}} autoPlay muted loop playsInline />\n",
            js_str(video)
        ));
    } else {
        out.push_str(&format!(
            "            <img src={{{}}} alt=\"\" />\n",
            js_str(&manifest.front_image_url)
        ));
    }
    out.push_str("          </div>\n");
    if let Some(back) = &manifest.back_image_url {
        out.push_str("          <div className=\"card-face card-back\">\n");
        out.push_str(&format!(
            "            <img src={{{}}} alt=\"\" />\n",
            js_str(back)
        ));
        out.push_str("          </div>\n");
    }
    out.push_str("        </div>\n");
    out.push_str("      </section>\n");
    out
}

/// Millimeter dimension rendered at 4px/mm.
fn format_dimension(mm: f64) -> String {
    format!("{}", (mm * 4.0).round() as i64)
}

fn gitignore() -> String {
    concat!("node_modules/\n", ".next/\n", "out/\n", ".env\n", ".env.local\n").to_string()
}

fn env_example(bundle: &SiteBundle) -> String {
    if bundle.site.user_management {
        concat!(
            "NEXT_PUBLIC_AUTH_PUBLISHABLE_KEY=\n",
            "AUTH_SECRET_KEY=\n",
        )
        .to_string()
    } else {
        "# No environment variables required\n".to_string()
    }
}

fn readme(bundle: &SiteBundle) -> String {
    format!(
        "# {}\n\nGenerated campaign site.\n\n## Setup\n\n```\nnpm install\nnpm run dev\n```\n\n\
         Build a static export with `npm run build`; output lands in `out/`.\n{}",
        bundle.site.display_name,
        if bundle.site.user_management {
            "\nCopy `.env.example` to `.env.local` and fill in the auth keys before building.\n"
        } else {
            ""
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeploymentStatus, Site, SiteStatus};

    fn site(user_management: bool) -> Site {
        Site {
            id: "site-1".to_string(),
            name: "tour".to_string(),
            display_name: "Tour 2026".to_string(),
            slug: "tour-2026".to_string(),
            status: SiteStatus::Draft,
            template_id: Some("tpl-1".to_string()),
            user_management,
            auth_publishable_key: None,
            auth_secret_key: None,
            hosting_project_id: None,
            hosting_deployment_id: None,
            deployment_url: None,
            deployment_status: DeploymentStatus::Idle,
            last_deployed_at: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn content(section: &str, order: i64, body: ContentBody) -> crate::models::ContentItem {
        crate::models::ContentItem {
            id: format!("c-{}-{}", section, order),
            site_id: "site-1".to_string(),
            section: section.to_string(),
            body,
            order,
            visible: true,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn bundle(user_management: bool, content_items: Vec<crate::models::ContentItem>) -> SiteBundle {
        SiteBundle {
            site: site(user_management),
            content: content_items,
            assets: vec![],
            active_card: None,
        }
    }

    #[test]
    fn test_hero_script_tag_stays_inside_string_literal() {
        let b = bundle(
            false,
            vec![content(
                "hero",
                0,
                ContentBody::Hero {
                    title: "<script>x</script>".to_string(),
                    subtitle: None,
                    media_url: None,
                    media_kind: None,
                    cta_label: Some("Join".to_string()),
                    cta_href: Some("https://x.example/\" onload=\"evil()".to_string()),
                },
            )],
        );
        let project = generate(&b);
        let page = project.files["app/page.tsx"].as_text().unwrap();

        // The title appears only as a quoted JSX expression
        assert!(page.contains(r#"<h1>{"<script>x</script>"}</h1>"#));
        assert!(!page.contains("<h1><script>"));
        // The quote in the href is escaped, so it cannot close the literal
        assert!(page.contains(r#"href={"https://x.example/\" onload=\"evil()"}"#));
        assert!(!page.contains(r#"href={"https://x.example/" "#));
    }

    #[test]
    fn test_rich_text_is_the_only_raw_html_sink() {
        let b = bundle(
            false,
            vec![
                content(
                    "description",
                    0,
                    ContentBody::RichText {
                        html: "<em>on sale</em>".to_string(),
                    },
                ),
                content(
                    "description",
                    1,
                    ContentBody::Text {
                        text: "<em>not html</em>".to_string(),
                    },
                ),
            ],
        );
        let project = generate(&b);
        let page = project.files["app/page.tsx"].as_text().unwrap();

        assert!(page.contains(r#"dangerouslySetInnerHTML={{ __html: "<em>on sale</em>" }}"#));
        // The plain-text block carries its markup inside a string literal
        assert!(page.contains(r#"<p>{"<em>not html</em>"}</p>"#));
    }

    #[test]
    fn test_description_blocks_render_in_order() {
        let b = bundle(
            false,
            vec![
                content(
                    "description",
                    10,
                    ContentBody::Text {
                        text: "second".to_string(),
                    },
                ),
                content(
                    "description",
                    5,
                    ContentBody::Text {
                        text: "first".to_string(),
                    },
                ),
            ],
        );
        // Repository ordering is by (section, sort_order); mirror it here
        let mut b = b;
        b.content.sort_by_key(|c| c.order);

        let project = generate(&b);
        let page = project.files["app/page.tsx"].as_text().unwrap();
        let first = page.find(r#"{"first"}"#).unwrap();
        let second = page.find(r#"{"second"}"#).unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_invisible_content_is_skipped() {
        let mut item = content(
            "description",
            0,
            ContentBody::Text {
                text: "hidden".to_string(),
            },
        );
        item.visible = false;
        let project = generate(&bundle(false, vec![item]));
        let page = project.files["app/page.tsx"].as_text().unwrap();
        assert!(!page.contains("hidden"));
    }

    #[test]
    fn test_auth_dependency_only_with_user_management() {
        let with = generate(&bundle(true, vec![]));
        let without = generate(&bundle(false, vec![]));

        let with_pkg = with.files["package.json"].as_text().unwrap();
        let without_pkg = without.files["package.json"].as_text().unwrap();
        assert!(with_pkg.contains(AUTH_SDK_PACKAGE));
        assert!(!without_pkg.contains(AUTH_SDK_PACKAGE));

        let with_layout = with.files["app/layout.tsx"].as_text().unwrap();
        let without_layout = without.files["app/layout.tsx"].as_text().unwrap();
        assert!(with_layout.contains("<AuthProvider"));
        assert!(!without_layout.contains("<AuthProvider"));
    }

    #[test]
    fn test_active_card_renders_with_effect_classes() {
        let mut b = bundle(false, vec![]);
        b.active_card = Some(crate::models::CardManifest {
            id: "card-1".to_string(),
            site_id: "site-1".to_string(),
            manifest: CardManifestBody {
                width_mm: 63.0,
                height_mm: 88.0,
                front_image_url: "https://blob.example/front.png".to_string(),
                front_video_url: None,
                back_image_url: Some("https://blob.example/back.png".to_string()),
                foil: true,
                holographic: true,
                metadata: None,
            },
            active: true,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        });

        let project = generate(&b);
        let page = project.files["app/page.tsx"].as_text().unwrap();
        assert!(page.contains("card foil holo"));
        assert!(page.contains(r#"{"https://blob.example/front.png"}"#));
        assert!(page.contains("card-back"));
        // 63mm at 4px/mm
        assert!(page.contains("width: 252"));
    }

    #[test]
    fn test_packaging_files_present() {
        let project = generate(&bundle(false, vec![]));
        for path in [
            "package.json",
            "next.config.mjs",
            "app/globals.css",
            "app/layout.tsx",
            "app/page.tsx",
            ".gitignore",
            ".env.example",
            "README.md",
        ] {
            assert!(project.files.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_display_name_escaped_in_layout_metadata() {
        let mut b = bundle(false, vec![]);
        b.site.display_name = "Tour \"26\"".to_string();
        let project = generate(&b);
        let layout = project.files["app/layout.tsx"].as_text().unwrap();
        assert!(layout.contains(r#"title: "Tour \"26\"""#));
    }
}
