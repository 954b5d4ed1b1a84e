//! Page-level property overrides registered before any site script runs.

use crate::profile::BrowserProfile;

/// Build the init script for a profile.
///
/// Hides `navigator.webdriver`, fakes a plugin list and languages, pins the
/// WebGL vendor/renderer strings, and reports the profile's timezone.
pub fn stealth_script(profile: &BrowserProfile) -> String {
    let languages = serde_json::to_string(&profile.languages()).unwrap_or_else(|_| "[]".into());
    let vendor = js_string(&profile.webgl_vendor);
    let renderer = js_string(&profile.webgl_renderer);
    let timezone = js_string(&profile.timezone);
    let platform = js_string(profile.platform());

    format!(
        r#"(() => {{
  const define = (obj, prop, value) => {{
    try {{ Object.defineProperty(obj, prop, {{ get: () => value, configurable: true }}); }} catch (_) {{}}
  }};
  define(Navigator.prototype, 'webdriver', undefined);
  define(Navigator.prototype, 'languages', {languages});
  define(Navigator.prototype, 'platform', {platform});
  define(Navigator.prototype, 'hardwareConcurrency', 8);
  const plugins = [
    {{ name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }},
    {{ name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }},
    {{ name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }},
  ];
  define(Navigator.prototype, 'plugins', Object.assign(plugins, {{ item: (i) => plugins[i], namedItem: (n) => plugins.find(p => p.name === n) }}));
  window.chrome = window.chrome || {{ runtime: {{}} }};
  const patchGl = (proto) => {{
    if (!proto) return;
    const original = proto.getParameter;
    proto.getParameter = function (param) {{
      if (param === 37445) return {vendor};
      if (param === 37446) return {renderer};
      return original.call(this, param);
    }};
  }};
  patchGl(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
  patchGl(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);
  const resolved = Intl.DateTimeFormat.prototype.resolvedOptions;
  Intl.DateTimeFormat.prototype.resolvedOptions = function () {{
    return Object.assign(resolved.call(this), {{ timeZone: {timezone} }});
  }};
  const query = navigator.permissions && navigator.permissions.query;
  if (query) {{
    navigator.permissions.query = (p) => p && p.name === 'notifications'
      ? Promise.resolve({{ state: Notification.permission }})
      : query.call(navigator.permissions, p);
  }}
}})();"#
    )
}

fn js_string(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".into())
}
