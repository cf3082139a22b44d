//! Turns a caller's fragment shader into something the GLSL 450 frontend
//! accepts, and records which loose uniforms ended up where.

use std::borrow::Cow;

use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::ShaderStage;

use crate::uniforms::{GlslType, UniformLayout};

pub(crate) const TEXTURE_BINDING: u32 = 0;
pub(crate) const SAMPLER_BINDING: u32 = 1;
pub(crate) const PARAMS_BINDING: u32 = 2;

const DEFAULT_TEX_COORD: &str = "imgfx_tex_coord";
const FRAG_COLOR: &str = "imgfx_frag_color";
const PRECISIONS: [&str; 3] = ["lowp", "mediump", "highp"];

/// A fragment shader rewritten for the pipeline plus the uniform block
/// layout extracted from it.
#[derive(Debug, Clone)]
pub(crate) struct WrappedFragment {
    pub source: String,
    pub layout: UniformLayout,
}

/// Rewrites caller GLSL so it can be compiled against our bind groups.
///
/// 1. Drop `#version` and `precision` statements.
/// 2. Move `uniform` declarations of scalar and vector types into one std140
///    block and alias each name to its block field with a `#define`.
/// 3. Alias `sampler2D` uniforms to the bound source texture and sampler.
/// 4. Pin the interpolated texture coordinate and the colour output to
///    location 0, mapping `gl_FragColor` and `texture2D` for older shaders.
///
/// Declarations that do not fit (arrays, matrices, several statements on one
/// line) are left untouched and surface as compile errors.
pub(crate) fn wrap_fragment(source: &str) -> WrappedFragment {
    let mut layout = UniformLayout::default();
    let mut tex_coord: Option<String> = None;
    let mut frag_output: Option<String> = None;
    let mut body = String::with_capacity(source.len());

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") || is_precision_statement(trimmed) {
            body.push('\n');
            continue;
        }

        if let Some(decl) = parse_declaration(trimmed) {
            let handled = match decl.qualifier {
                Qualifier::Uniform => claim_uniform(&mut layout, &decl),
                Qualifier::Input if decl.is_single("vec2") && tex_coord.is_none() => {
                    tex_coord = decl.names.first().cloned();
                    true
                }
                Qualifier::Output if decl.is_single("vec4") && frag_output.is_none() => {
                    frag_output = decl.names.first().cloned();
                    true
                }
                _ => false,
            };
            if handled {
                // Keep line numbers aligned with the caller's source.
                body.push('\n');
                continue;
            }
        }

        body.push_str(&strip_void_parameter(line));
        body.push('\n');
    }

    let header = render_header(&layout, tex_coord.as_deref(), frag_output.as_deref());
    WrappedFragment {
        source: format!("{header}#line 1\n{body}"),
        layout,
    }
}

/// Runs the GLSL frontend over a wrapped fragment so syntax errors surface as
/// text instead of a device validation failure.
pub(crate) fn parse_fragment(wrapped: &str) -> Result<(), String> {
    let mut frontend = Frontend::default();
    frontend
        .parse(&Options::from(ShaderStage::Fragment), wrapped)
        .map(|_| ())
        .map_err(|errors| {
            errors
                .errors
                .iter()
                .map(|error| error.kind.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        })
}

fn claim_uniform(layout: &mut UniformLayout, decl: &Declaration<'_>) -> bool {
    if decl.names.iter().any(|name| name.contains('[')) {
        return false;
    }
    if decl.ty == "sampler2D" {
        for name in &decl.names {
            layout.push_sampler(name);
        }
        return true;
    }
    match GlslType::parse(decl.ty) {
        Some(ty) => {
            for name in &decl.names {
                if !layout.push(name, ty) {
                    tracing::debug!(uniform = %name, "duplicate uniform declaration ignored");
                }
            }
            true
        }
        None => false,
    }
}

fn render_header(layout: &UniformLayout, tex_coord: Option<&str>, output: Option<&str>) -> String {
    let mut header = String::from("#version 450\n");
    let tex_coord = tex_coord.unwrap_or(DEFAULT_TEX_COORD);
    header.push_str(&format!("layout(location = 0) in vec2 {tex_coord};\n"));
    match output {
        Some(name) => {
            header.push_str(&format!("layout(location = 0) out vec4 {name};\n"));
            header.push_str(&format!("#define gl_FragColor {name}\n"));
        }
        None => {
            header.push_str(&format!("layout(location = 0) out vec4 {FRAG_COLOR};\n"));
            header.push_str(&format!("#define gl_FragColor {FRAG_COLOR}\n"));
        }
    }

    header.push_str(&format!(
        "layout(set = 1, binding = {TEXTURE_BINDING}) uniform texture2D imgfx_texture;\n\
         layout(set = 1, binding = {SAMPLER_BINDING}) uniform sampler imgfx_sampler;\n"
    ));

    header.push_str(&format!(
        "layout(std140, set = 1, binding = {PARAMS_BINDING}) uniform FilterParams {{\n"
    ));
    if layout.slots().is_empty() {
        header.push_str("    float _imgfx_reserved;\n");
    }
    for slot in layout.slots() {
        header.push_str(&format!("    {} _{};\n", slot.ty.storage_keyword(), slot.name));
    }
    header.push_str("} imgfx_params;\n");

    for slot in layout.slots() {
        let field = format!("imgfx_params._{}", slot.name);
        header.push_str(&format!(
            "#define {} {}\n",
            slot.name,
            slot.ty.field_expression(&field)
        ));
    }
    for sampler in layout.samplers() {
        header.push_str(&format!(
            "#define {sampler} sampler2D(imgfx_texture, imgfx_sampler)\n"
        ));
    }
    header.push_str("#define texture2D texture\n");
    header
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qualifier {
    Uniform,
    Input,
    Output,
}

#[derive(Debug)]
struct Declaration<'a> {
    qualifier: Qualifier,
    ty: &'a str,
    names: Vec<String>,
}

impl Declaration<'_> {
    fn is_single(&self, ty: &str) -> bool {
        self.ty == ty && self.names.len() == 1 && !self.names[0].contains('[')
    }
}

/// Parses a single `qualifier [precision] type name[, name];` statement.
fn parse_declaration(line: &str) -> Option<Declaration<'_>> {
    let code = strip_line_comment(line).trim_end();
    let statement = code.strip_suffix(';')?;
    if statement.contains(';') || statement.contains('{') || statement.contains('=') {
        return None;
    }

    let mut tokens = statement.split_whitespace();
    let qualifier = match tokens.next()? {
        "uniform" => Qualifier::Uniform,
        "varying" | "in" => Qualifier::Input,
        "out" => Qualifier::Output,
        _ => return None,
    };
    let mut ty = tokens.next()?;
    if PRECISIONS.contains(&ty) {
        ty = tokens.next()?;
    }

    let names: Vec<String> = tokens
        .collect::<Vec<_>>()
        .join(" ")
        .split(',')
        .map(|name| name.trim().to_string())
        .collect();
    if names.iter().any(|name| !is_identifier(name)) {
        return None;
    }
    Some(Declaration {
        qualifier,
        ty,
        names,
    })
}

/// Rewrites `void main(void)` to `void main()`, which the 450 frontend
/// requires. Other functions taking `(void)` are left alone.
fn strip_void_parameter(line: &str) -> Cow<'_, str> {
    let Some(start) = find_word(line, "main") else {
        return Cow::Borrowed(line);
    };
    if !line[..start].trim_end().ends_with("void") {
        return Cow::Borrowed(line);
    }
    let rest = line[start + "main".len()..].trim_start();
    let tail = rest
        .strip_prefix('(')
        .map(str::trim_start)
        .and_then(|params| params.strip_prefix("void"))
        .map(str::trim_start)
        .and_then(|params| params.strip_prefix(')'));
    match tail {
        Some(tail) => Cow::Owned(format!("{}main(){tail}", &line[..start])),
        None => Cow::Borrowed(line),
    }
}

fn find_word(line: &str, word: &str) -> Option<usize> {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    line.match_indices(word).map(|(index, _)| index).find(|&index| {
        let before = line[..index].chars().next_back();
        let after = line[index + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(index) => &line[..index],
        None => line,
    }
}

fn is_precision_statement(line: &str) -> bool {
    line.starts_with("precision ") && line.trim_end().ends_with(';')
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '[' || c == ']')
}

/// Vertex stage shared by every filter: draws the unit quad through the
/// model-view and projection matrices and forwards the texture coordinate.
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec3 aVertexPosition;
layout(location = 1) in vec2 aTextureCoord;

layout(std140, set = 0, binding = 0) uniform Transform {
    mat4 uMVMatrix;
    mat4 uPMatrix;
} transform;

layout(location = 0) out vec2 vTextureCoord;

void main() {
    gl_Position = transform.uPMatrix * transform.uMVMatrix * vec4(aVertexPosition, 1.0);
    vTextureCoord = aTextureCoord;
}
";

/// Fragment stage that samples the source unchanged.
pub const IDENTITY_FRAGMENT: &str = r"precision mediump float;
varying vec2 vTextureCoord;
uniform sampler2D uSampler;

void main(void) {
    gl_FragColor = texture2D(uSampler, vTextureCoord);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const SEPIA: &str = r"#version 100
precision mediump float;
varying vec2 vTextureCoord;
uniform sampler2D uSampler;
uniform float uAmount;
uniform highp float uSceneWidth, uSceneHeight; // sizes
void main(void) {
    vec4 c = texture2D(uSampler, vTextureCoord);
    gl_FragColor = vec4(c.rgb * uAmount, c.a);
}
";

    #[test]
    fn uniforms_move_into_the_block() {
        let wrapped = wrap_fragment(SEPIA);
        assert!(wrapped.source.starts_with("#version 450\n"));
        assert!(!wrapped.source.contains("#version 100"));
        assert!(!wrapped.source.contains("uniform float uAmount"));
        assert!(wrapped.source.contains("    float _uAmount;\n"));
        assert!(wrapped.source.contains("#define uAmount imgfx_params._uAmount"));
        assert!(wrapped.source.contains("#define uSceneHeight imgfx_params._uSceneHeight"));

        let names: Vec<_> = wrapped.layout.slots().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["uAmount", "uSceneWidth", "uSceneHeight"]);
        assert_eq!(wrapped.layout.samplers(), ["uSampler".to_string()]);
    }

    #[test]
    fn varying_and_frag_color_are_pinned() {
        let wrapped = wrap_fragment(SEPIA);
        assert!(wrapped
            .source
            .contains("layout(location = 0) in vec2 vTextureCoord;"));
        assert!(wrapped.source.contains("#define gl_FragColor imgfx_frag_color"));
        assert!(wrapped
            .source
            .contains("#define uSampler sampler2D(imgfx_texture, imgfx_sampler)"));
        assert!(wrapped.source.contains("void main() {"));
    }

    #[test]
    fn line_numbers_survive_wrapping() {
        let wrapped = wrap_fragment(SEPIA);
        let (_, body) = wrapped.source.split_once("#line 1\n").unwrap();
        assert_eq!(body.lines().count(), SEPIA.lines().count());
    }

    #[test]
    fn explicit_outputs_are_respected() {
        let source = "#version 300 es\nin vec2 uv;\nout vec4 color;\nvoid main() { color = vec4(uv, 0.0, 1.0); }\n";
        let wrapped = wrap_fragment(source);
        assert!(wrapped.source.contains("layout(location = 0) in vec2 uv;"));
        assert!(wrapped.source.contains("layout(location = 0) out vec4 color;"));
        assert!(wrapped.source.contains("float _imgfx_reserved;"));
    }

    #[test]
    fn unsupported_uniforms_stay_in_place() {
        let source = "uniform float uKernel[9];\nuniform mat3 uMatrix;\nvoid main() {}\n";
        let wrapped = wrap_fragment(source);
        assert!(wrapped.source.contains("uniform float uKernel[9];"));
        assert!(wrapped.source.contains("uniform mat3 uMatrix;"));
        assert!(wrapped.layout.slots().is_empty());
    }

    #[test]
    fn frontend_accepts_wrapped_identity() {
        let wrapped = wrap_fragment(IDENTITY_FRAGMENT);
        parse_fragment(&wrapped.source).unwrap();
    }

    #[test]
    fn frontend_rejects_garbage() {
        let wrapped = wrap_fragment("void main() { this is not glsl }");
        assert!(parse_fragment(&wrapped.source).is_err());
    }

    #[test]
    fn bool_uniforms_are_stored_as_int() {
        let source = "precision mediump float;\nuniform bool uInvert;\nvoid main() {\n    if (uInvert) { gl_FragColor = vec4(1.0); }\n}\n";
        let wrapped = wrap_fragment(source);
        assert!(!wrapped.source.contains("uniform bool uInvert;"));
        assert!(wrapped.source.contains("    int _uInvert;\n"));
        assert!(wrapped
            .source
            .contains("#define uInvert (imgfx_params._uInvert != 0)"));
        parse_fragment(&wrapped.source).unwrap();
    }

    #[test]
    fn only_the_entry_point_loses_its_void_parameter() {
        assert_eq!(strip_void_parameter("void main(void) {"), "void main() {");
        assert_eq!(strip_void_parameter("void main ( void ) {"), "void main() {");
        assert_eq!(
            strip_void_parameter("float domain(void) { return 1.0; }"),
            "float domain(void) { return 1.0; }"
        );
        assert_eq!(strip_void_parameter("float main_weight(void);"), "float main_weight(void);");
        assert_eq!(strip_void_parameter("void main() {"), "void main() {");

        let wrapped = wrap_fragment("float domain(void) { return 0.5; }\nvoid main(void) {\n    gl_FragColor = vec4(domain());\n}\n");
        assert!(wrapped.source.contains("float domain(void)"));
        assert!(wrapped.source.contains("void main() {"));
    }

    #[test]
    fn declaration_parser_ignores_code() {
        assert!(parse_declaration("float x = 1.0;").is_none());
        assert!(parse_declaration("uniform float a; uniform float b;").is_none());
        let decl = parse_declaration("uniform lowp vec4 uTint;").unwrap();
        assert_eq!(decl.ty, "vec4");
        assert_eq!(decl.names, vec!["uTint".to_string()]);
    }
}
