//! Caller-facing shader uniforms and the uniform block they are written into.
//!
//! Fragment shaders declare loose `uniform float uTime;` style variables. The
//! wrapper in `compile` gathers those declarations into a single std140 block;
//! [`UniformLayout`] mirrors that block on the CPU so a uniform can be resolved
//! by name to a byte offset and written with the matching typed assignment.

use std::fmt;
use std::str::FromStr;

use crate::error::FilterError;

/// Type tag of a uniform assignment: component count plus float/int.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float1,
    Int1,
    Float2,
    Int2,
    Float3,
    Int3,
    Float4,
    Int4,
}

impl UniformKind {
    pub const ALL: [UniformKind; 8] = [
        UniformKind::Float1,
        UniformKind::Int1,
        UniformKind::Float2,
        UniformKind::Int2,
        UniformKind::Float3,
        UniformKind::Int3,
        UniformKind::Float4,
        UniformKind::Int4,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            UniformKind::Float1 => "1f",
            UniformKind::Int1 => "1i",
            UniformKind::Float2 => "2f",
            UniformKind::Int2 => "2i",
            UniformKind::Float3 => "3f",
            UniformKind::Int3 => "3i",
            UniformKind::Float4 => "4f",
            UniformKind::Int4 => "4i",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            UniformKind::Float1 | UniformKind::Int1 => 1,
            UniformKind::Float2 | UniformKind::Int2 => 2,
            UniformKind::Float3 | UniformKind::Int3 => 3,
            UniformKind::Float4 | UniformKind::Int4 => 4,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for UniformKind {
    type Err = FilterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        UniformKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == normalized)
            .ok_or_else(|| {
                FilterError::invalid(format!("invalid shader var specified: type '{raw}'"))
            })
    }
}

/// One uniform assignment for a single filter invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum ShaderUniform {
    OneF { name: String, x: f32 },
    OneI { name: String, x: i32 },
    TwoF { name: String, x: f32, y: f32 },
    TwoI { name: String, x: i32, y: i32 },
    ThreeF { name: String, x: f32, y: f32, z: f32 },
    ThreeI { name: String, x: i32, y: i32, z: i32 },
    FourF { name: String, x: f32, y: f32, z: f32, w: f32 },
    FourI { name: String, x: i32, y: i32, z: i32, w: i32 },
}

impl ShaderUniform {
    pub fn one_f(name: impl Into<String>, x: f32) -> Self {
        ShaderUniform::OneF {
            name: name.into(),
            x,
        }
    }

    pub fn one_i(name: impl Into<String>, x: i32) -> Self {
        ShaderUniform::OneI {
            name: name.into(),
            x,
        }
    }

    pub fn two_f(name: impl Into<String>, x: f32, y: f32) -> Self {
        ShaderUniform::TwoF {
            name: name.into(),
            x,
            y,
        }
    }

    pub fn two_i(name: impl Into<String>, x: i32, y: i32) -> Self {
        ShaderUniform::TwoI {
            name: name.into(),
            x,
            y,
        }
    }

    pub fn three_f(name: impl Into<String>, x: f32, y: f32, z: f32) -> Self {
        ShaderUniform::ThreeF {
            name: name.into(),
            x,
            y,
            z,
        }
    }

    pub fn three_i(name: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        ShaderUniform::ThreeI {
            name: name.into(),
            x,
            y,
            z,
        }
    }

    pub fn four_f(name: impl Into<String>, x: f32, y: f32, z: f32, w: f32) -> Self {
        ShaderUniform::FourF {
            name: name.into(),
            x,
            y,
            z,
            w,
        }
    }

    pub fn four_i(name: impl Into<String>, x: i32, y: i32, z: i32, w: i32) -> Self {
        ShaderUniform::FourI {
            name: name.into(),
            x,
            y,
            z,
            w,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ShaderUniform::OneF { name, .. }
            | ShaderUniform::OneI { name, .. }
            | ShaderUniform::TwoF { name, .. }
            | ShaderUniform::TwoI { name, .. }
            | ShaderUniform::ThreeF { name, .. }
            | ShaderUniform::ThreeI { name, .. }
            | ShaderUniform::FourF { name, .. }
            | ShaderUniform::FourI { name, .. } => name,
        }
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            ShaderUniform::OneF { .. } => UniformKind::Float1,
            ShaderUniform::OneI { .. } => UniformKind::Int1,
            ShaderUniform::TwoF { .. } => UniformKind::Float2,
            ShaderUniform::TwoI { .. } => UniformKind::Int2,
            ShaderUniform::ThreeF { .. } => UniformKind::Float3,
            ShaderUniform::ThreeI { .. } => UniformKind::Int3,
            ShaderUniform::FourF { .. } => UniformKind::Float4,
            ShaderUniform::FourI { .. } => UniformKind::Int4,
        }
    }

    /// Whether the first component is non-zero.
    fn is_truthy(&self) -> bool {
        match self {
            ShaderUniform::OneF { x, .. }
            | ShaderUniform::TwoF { x, .. }
            | ShaderUniform::ThreeF { x, .. }
            | ShaderUniform::FourF { x, .. } => *x != 0.0,
            ShaderUniform::OneI { x, .. }
            | ShaderUniform::TwoI { x, .. }
            | ShaderUniform::ThreeI { x, .. }
            | ShaderUniform::FourI { x, .. } => *x != 0,
        }
    }

    /// Native-endian component bytes, `4 * arity` long.
    fn component_bytes(&self) -> Vec<u8> {
        match self {
            ShaderUniform::OneF { x, .. } => bytemuck::bytes_of(x).to_vec(),
            ShaderUniform::OneI { x, .. } => bytemuck::bytes_of(x).to_vec(),
            ShaderUniform::TwoF { x, y, .. } => bytemuck::cast_slice(&[*x, *y]).to_vec(),
            ShaderUniform::TwoI { x, y, .. } => bytemuck::cast_slice(&[*x, *y]).to_vec(),
            ShaderUniform::ThreeF { x, y, z, .. } => bytemuck::cast_slice(&[*x, *y, *z]).to_vec(),
            ShaderUniform::ThreeI { x, y, z, .. } => bytemuck::cast_slice(&[*x, *y, *z]).to_vec(),
            ShaderUniform::FourF { x, y, z, w, .. } => {
                bytemuck::cast_slice(&[*x, *y, *z, *w]).to_vec()
            }
            ShaderUniform::FourI { x, y, z, w, .. } => {
                bytemuck::cast_slice(&[*x, *y, *z, *w]).to_vec()
            }
        }
    }
}

/// Untyped uniform description as it arrives from configuration files or
/// other dynamic sources. [`UniformDescriptor::resolve`] is the only place an
/// unknown type tag can appear.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformDescriptor {
    pub name: String,
    pub kind: String,
    pub values: Vec<f64>,
}

impl UniformDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            values,
        }
    }

    pub fn resolve(&self) -> Result<ShaderUniform, FilterError> {
        ShaderUniform::try_from(self)
    }
}

impl TryFrom<&UniformDescriptor> for ShaderUniform {
    type Error = FilterError;

    fn try_from(descriptor: &UniformDescriptor) -> Result<Self, Self::Error> {
        let name = descriptor.name.trim();
        if name.is_empty() {
            return Err(FilterError::invalid(
                "invalid shader var specified: empty name",
            ));
        }
        let kind: UniformKind = descriptor.kind.parse()?;
        if descriptor.values.len() != kind.arity() {
            return Err(FilterError::invalid(format!(
                "invalid shader var specified: '{name}' of type {kind} needs {} value(s), got {}",
                kind.arity(),
                descriptor.values.len()
            )));
        }

        let f = |index: usize| descriptor.values[index] as f32;
        let i = |index: usize| descriptor.values[index] as i32;
        let uniform = match kind {
            UniformKind::Float1 => ShaderUniform::one_f(name, f(0)),
            UniformKind::Int1 => ShaderUniform::one_i(name, i(0)),
            UniformKind::Float2 => ShaderUniform::two_f(name, f(0), f(1)),
            UniformKind::Int2 => ShaderUniform::two_i(name, i(0), i(1)),
            UniformKind::Float3 => ShaderUniform::three_f(name, f(0), f(1), f(2)),
            UniformKind::Int3 => ShaderUniform::three_i(name, i(0), i(1), i(2)),
            UniformKind::Float4 => ShaderUniform::four_f(name, f(0), f(1), f(2), f(3)),
            UniformKind::Int4 => ShaderUniform::four_i(name, i(0), i(1), i(2), i(3)),
        };
        Ok(uniform)
    }
}

/// Resolves every descriptor, failing on the first malformed one.
pub fn resolve_all(descriptors: &[UniformDescriptor]) -> Result<Vec<ShaderUniform>, FilterError> {
    descriptors.iter().map(ShaderUniform::try_from).collect()
}

/// GLSL types that can live in the generated uniform block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GlslType {
    /// Stored as an `int` holding 0 or 1; `bool` is not host-shareable.
    Bool,
    Float,
    Int,
    Vec2,
    IVec2,
    Vec3,
    IVec3,
    Vec4,
    IVec4,
}

impl GlslType {
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "bool" => Some(GlslType::Bool),
            "float" => Some(GlslType::Float),
            "int" => Some(GlslType::Int),
            "vec2" => Some(GlslType::Vec2),
            "ivec2" => Some(GlslType::IVec2),
            "vec3" => Some(GlslType::Vec3),
            "ivec3" => Some(GlslType::IVec3),
            "vec4" => Some(GlslType::Vec4),
            "ivec4" => Some(GlslType::IVec4),
            _ => None,
        }
    }

    /// Type of the backing field in the uniform block.
    pub fn storage_keyword(self) -> &'static str {
        match self {
            GlslType::Bool | GlslType::Int => "int",
            GlslType::Float => "float",
            GlslType::Vec2 => "vec2",
            GlslType::IVec2 => "ivec2",
            GlslType::Vec3 => "vec3",
            GlslType::IVec3 => "ivec3",
            GlslType::Vec4 => "vec4",
            GlslType::IVec4 => "ivec4",
        }
    }

    /// Expression the caller's name expands to.
    pub fn field_expression(self, field: &str) -> String {
        match self {
            GlslType::Bool => format!("({field} != 0)"),
            _ => field.to_string(),
        }
    }

    /// Assignment kind reported for this type in mismatch diagnostics.
    pub fn kind(self) -> UniformKind {
        match self {
            GlslType::Float => UniformKind::Float1,
            GlslType::Bool | GlslType::Int => UniformKind::Int1,
            GlslType::Vec2 => UniformKind::Float2,
            GlslType::IVec2 => UniformKind::Int2,
            GlslType::Vec3 => UniformKind::Float3,
            GlslType::IVec3 => UniformKind::Int3,
            GlslType::Vec4 => UniformKind::Float4,
            GlslType::IVec4 => UniformKind::Int4,
        }
    }

    /// `bool` takes either scalar kind, like `uniform1i`/`uniform1f` in WebGL.
    pub fn accepts(self, kind: UniformKind) -> bool {
        match self {
            GlslType::Bool => matches!(kind, UniformKind::Int1 | UniformKind::Float1),
            _ => self.kind() == kind,
        }
    }

    /// std140 base alignment in bytes.
    fn align(self) -> u32 {
        match self.kind().arity() {
            1 => 4,
            2 => 8,
            _ => 16,
        }
    }

    fn size(self) -> u32 {
        4 * self.kind().arity() as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UniformSlot {
    pub name: String,
    pub ty: GlslType,
    pub offset: u32,
}

/// CPU mirror of the generated std140 block, plus the names of sampler
/// uniforms (all of which read texture unit 0).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct UniformLayout {
    slots: Vec<UniformSlot>,
    samplers: Vec<String>,
    end: u32,
}

pub(crate) enum UniformLocation<'a> {
    Value(&'a UniformSlot),
    Sampler,
}

impl UniformLayout {
    /// Appends a member; duplicates keep their first declaration.
    pub fn push(&mut self, name: &str, ty: GlslType) -> bool {
        if self.locate(name).is_some() {
            return false;
        }
        let offset = align_up(self.end, ty.align());
        self.end = offset + ty.size();
        self.slots.push(UniformSlot {
            name: name.to_string(),
            ty,
            offset,
        });
        true
    }

    pub fn push_sampler(&mut self, name: &str) -> bool {
        if self.locate(name).is_some() {
            return false;
        }
        self.samplers.push(name.to_string());
        true
    }

    pub fn slots(&self) -> &[UniformSlot] {
        &self.slots
    }

    pub fn samplers(&self) -> &[String] {
        &self.samplers
    }

    pub fn locate(&self, name: &str) -> Option<UniformLocation<'_>> {
        if let Some(slot) = self.slots.iter().find(|slot| slot.name == name) {
            return Some(UniformLocation::Value(slot));
        }
        self.samplers
            .iter()
            .any(|sampler| sampler == name)
            .then_some(UniformLocation::Sampler)
    }

    /// Bytes to allocate for the block: never empty, padded to 16.
    pub fn buffer_size(&self) -> u64 {
        u64::from(align_up(self.end.max(16), 16))
    }
}

/// Outcome of resolving and writing one uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Assignment {
    Written,
    Sampler,
    /// The shader never declared this name; assignment is a no-op.
    Unresolved,
    TypeMismatch { declared: UniformKind },
}

/// Staged contents of the uniform block for one program.
#[derive(Clone, Debug)]
pub(crate) struct UniformBlock {
    layout: UniformLayout,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let bytes = vec![0u8; layout.buffer_size() as usize];
        Self { layout, bytes }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Resolves `uniform` without writing it.
    pub fn check(&self, uniform: &ShaderUniform) -> Assignment {
        match self.layout.locate(uniform.name()) {
            None => Assignment::Unresolved,
            Some(UniformLocation::Sampler) => match uniform.kind() {
                UniformKind::Int1 => Assignment::Sampler,
                _ => Assignment::TypeMismatch {
                    declared: UniformKind::Int1,
                },
            },
            Some(UniformLocation::Value(slot)) => {
                if slot.ty.accepts(uniform.kind()) {
                    Assignment::Written
                } else {
                    Assignment::TypeMismatch {
                        declared: slot.ty.kind(),
                    }
                }
            }
        }
    }

    pub fn assign(&mut self, uniform: &ShaderUniform) -> Assignment {
        let outcome = self.check(uniform);
        if outcome != Assignment::Written {
            return outcome;
        }
        if let Some(UniformLocation::Value(slot)) = self.layout.locate(uniform.name()) {
            let start = slot.offset as usize;
            let payload = match slot.ty {
                GlslType::Bool => bytemuck::bytes_of(&i32::from(uniform.is_truthy())).to_vec(),
                _ => uniform.component_bytes(),
            };
            self.bytes[start..start + payload.len()].copy_from_slice(&payload);
        }
        outcome
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_tag() {
        for kind in UniformKind::ALL {
            assert_eq!(kind.tag().parse::<UniformKind>().unwrap(), kind);
        }
        assert_eq!(" 3F ".parse::<UniformKind>().unwrap(), UniformKind::Float3);
    }

    #[test]
    fn unknown_tag_is_invalid_argument() {
        let descriptor = UniformDescriptor::new("uTime", "5f", vec![1.0]);
        let err = descriptor.resolve().unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgument(ref msg) if msg.contains("invalid shader var specified")));
        assert!("matrix4".parse::<UniformKind>().is_err());
    }

    #[test]
    fn arity_mismatch_is_invalid_argument() {
        let descriptor = UniformDescriptor::new("uOffset", "2f", vec![1.0]);
        assert!(matches!(
            descriptor.resolve(),
            Err(FilterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn resolve_all_fails_without_partial_results() {
        let descriptors = vec![
            UniformDescriptor::new("uTime", "1f", vec![0.5]),
            UniformDescriptor::new("uBad", "9z", vec![]),
        ];
        assert!(resolve_all(&descriptors).is_err());
    }

    #[test]
    fn descriptor_truncates_integers() {
        let uniform = UniformDescriptor::new("uSteps", "2i", vec![3.9, -2.7])
            .resolve()
            .unwrap();
        assert_eq!(uniform, ShaderUniform::two_i("uSteps", 3, -2));
        assert_eq!(uniform.kind().arity(), 2);
    }

    #[test]
    fn layout_follows_std140_alignment() {
        let mut layout = UniformLayout::default();
        layout.push("uTime", GlslType::Float);
        layout.push("uOffset", GlslType::Vec2);
        layout.push("uTint", GlslType::Vec3);
        layout.push("uMode", GlslType::Int);
        layout.push("uRect", GlslType::Vec4);
        let offsets: Vec<_> = layout.slots().iter().map(|slot| slot.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 28, 32]);
        assert_eq!(layout.buffer_size(), 48);
    }

    #[test]
    fn empty_layout_still_allocates() {
        assert_eq!(UniformLayout::default().buffer_size(), 16);
    }

    #[test]
    fn assignment_writes_at_slot_offset() {
        let mut layout = UniformLayout::default();
        layout.push("uScale", GlslType::Float);
        layout.push("uColor", GlslType::Vec4);
        let mut block = UniformBlock::new(layout);

        let outcome = block.assign(&ShaderUniform::four_f("uColor", 1.0, 0.5, 0.25, 0.0));
        assert_eq!(outcome, Assignment::Written);
        let written: &[f32] = bytemuck::cast_slice(&block.as_bytes()[16..32]);
        assert_eq!(written, &[1.0, 0.5, 0.25, 0.0]);
    }

    #[test]
    fn unresolved_names_are_no_ops() {
        let mut block = UniformBlock::new(UniformLayout::default());
        let before = block.as_bytes().to_vec();
        assert_eq!(
            block.assign(&ShaderUniform::one_f("uMissing", 3.0)),
            Assignment::Unresolved
        );
        assert_eq!(block.as_bytes(), before.as_slice());
    }

    #[test]
    fn mismatched_type_is_not_written() {
        let mut layout = UniformLayout::default();
        layout.push("uTime", GlslType::Float);
        let mut block = UniformBlock::new(layout);
        assert_eq!(
            block.assign(&ShaderUniform::one_i("uTime", 7)),
            Assignment::TypeMismatch {
                declared: UniformKind::Float1
            }
        );
        assert!(block.as_bytes().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn bool_slots_store_zero_or_one() {
        let mut layout = UniformLayout::default();
        layout.push("uInvert", GlslType::Bool);
        layout.push("uTint", GlslType::Vec3);
        assert_eq!(layout.slots()[1].offset, 16);
        let mut block = UniformBlock::new(layout);

        assert_eq!(
            block.assign(&ShaderUniform::one_i("uInvert", 7)),
            Assignment::Written
        );
        assert_eq!(bytemuck::pod_read_unaligned::<i32>(&block.as_bytes()[0..4]), 1);

        assert_eq!(
            block.assign(&ShaderUniform::one_f("uInvert", 0.0)),
            Assignment::Written
        );
        assert_eq!(bytemuck::pod_read_unaligned::<i32>(&block.as_bytes()[0..4]), 0);

        assert_eq!(
            block.assign(&ShaderUniform::two_i("uInvert", 1, 1)),
            Assignment::TypeMismatch {
                declared: UniformKind::Int1
            }
        );
    }

    #[test]
    fn samplers_accept_unit_index() {
        let mut layout = UniformLayout::default();
        layout.push_sampler("uSampler");
        let mut block = UniformBlock::new(layout);
        assert_eq!(
            block.assign(&ShaderUniform::one_i("uSampler", 0)),
            Assignment::Sampler
        );
        assert!(matches!(
            block.assign(&ShaderUniform::one_f("uSampler", 0.0)),
            Assignment::TypeMismatch { .. }
        ));
    }
}
