//! Headless backend that records every call instead of drawing.
//!
//! Shader "compilation" scans the source for `in`/`attribute` and `uniform`
//! declarations, so programs expose the same locations a real driver would
//! report for simple GLSL.

use std::collections::BTreeMap;

use crate::backend::{
    BufferHandle, BufferKind, ClearMask, ClearValues, GpuBackend, GpuError, IndexWidth,
    Primitive, ProgramHandle, ShaderHandle, ShaderStage, UniformLocation, UniformValue,
    VertexArrayHandle,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CompileShader {
        stage: ShaderStage,
        shader: ShaderHandle,
    },
    LinkProgram {
        program: ProgramHandle,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    },
    UseProgram(ProgramHandle),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    UploadBuffer {
        kind: BufferKind,
        buffer: BufferHandle,
        bytes: usize,
    },
    BindAttribute {
        location: u32,
        buffer: BufferHandle,
        components: u32,
    },
    UploadUniform {
        location: UniformLocation,
        value: UniformValue,
    },
    SetFaceCulling(bool),
    DrawArrays {
        primitive: Primitive,
        first: u32,
        count: u32,
    },
    DrawElements {
        primitive: Primitive,
        count: u32,
        width: IndexWidth,
        offset: u32,
    },
    Clear {
        values: ClearValues,
        mask: ClearMask,
    },
}

impl GpuCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompileShader { .. } => "compile_shader",
            Self::LinkProgram { .. } => "link_program",
            Self::UseProgram(_) => "use_program",
            Self::CreateVertexArray(_) => "create_vertex_array",
            Self::BindVertexArray(_) => "bind_vertex_array",
            Self::UploadBuffer { .. } => "upload_buffer",
            Self::BindAttribute { .. } => "bind_attribute",
            Self::UploadUniform { .. } => "upload_uniform",
            Self::SetFaceCulling(_) => "set_face_culling",
            Self::DrawArrays { .. } => "draw_arrays",
            Self::DrawElements { .. } => "draw_elements",
            Self::Clear { .. } => "clear",
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawArrays { .. } | Self::DrawElements { .. })
    }
}

#[derive(Debug)]
struct CompiledShader {
    stage: ShaderStage,
    attributes: Vec<String>,
    uniforms: Vec<String>,
}

#[derive(Debug, Default)]
struct LinkedProgram {
    attributes: BTreeMap<String, u32>,
    uniforms: BTreeMap<String, UniformLocation>,
}

/// [`GpuBackend`] that keeps an ordered log of [`GpuCommand`]s.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<GpuCommand>,
    shaders: BTreeMap<u32, CompiledShader>,
    programs: BTreeMap<u32, LinkedProgram>,
    buffers: BTreeMap<u32, Vec<u8>>,
    vertex_arrays: u32,
    next_handle: u32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Hand over the log recorded so far and start a fresh one.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn count(&self, pred: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|&c| pred(c)).count()
    }

    /// Recorded commands grouped by name.
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        for command in &self.commands {
            *out.entry(command.name()).or_insert(0) += 1;
        }
        out
    }

    /// Bytes last uploaded to `buffer`.
    pub fn buffer(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn vertex_array_count(&self) -> u32 {
        self.vertex_arrays
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn shader(&self, handle: ShaderHandle) -> Result<&CompiledShader, GpuError> {
        self.shaders.get(&handle.0).ok_or(GpuError::InvalidHandle {
            kind: "shader",
            id: handle.0,
        })
    }
}

/// Drop a leading `layout(...)` qualifier.
fn strip_layout(line: &str) -> &str {
    match line.strip_prefix("layout") {
        Some(rest) => rest
            .find(')')
            .map_or(line, |close| rest[close + 1..].trim_start()),
        None => line,
    }
}

fn declared_name(declaration: &str) -> Option<String> {
    let last = declaration.split_whitespace().last()?;
    let name = last.split('[').next().unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}

fn scan(stage: ShaderStage, source: &str) -> Result<CompiledShader, GpuError> {
    let fail = |log: &str| GpuError::ShaderCompile {
        stage,
        log: log.to_string(),
    };
    if source.trim().is_empty() {
        return Err(fail("empty source"));
    }
    if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
        return Err(fail(line.trim()));
    }
    if !source.contains("void main") {
        return Err(fail("no entry point 'main'"));
    }

    let mut attributes = Vec::new();
    let mut uniforms = Vec::new();
    for line in source.lines() {
        let Some(declaration) = strip_layout(line.trim()).strip_suffix(';') else {
            continue;
        };
        let target = match declaration.split_whitespace().next() {
            Some("in" | "attribute") if stage == ShaderStage::Vertex => &mut attributes,
            Some("uniform") => &mut uniforms,
            _ => continue,
        };
        if let Some(name) = declared_name(declaration) {
            target.push(name);
        }
    }
    Ok(CompiledShader {
        stage,
        attributes,
        uniforms,
    })
}

impl GpuBackend for RecordingBackend {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, GpuError> {
        let compiled = scan(stage, source)?;
        let shader = ShaderHandle(self.next());
        self.shaders.insert(shader.0, compiled);
        self.commands.push(GpuCommand::CompileShader { stage, shader });
        Ok(shader)
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, GpuError> {
        let vs = self.shader(vertex)?;
        let fs = self.shader(fragment)?;
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err(GpuError::ProgramLink {
                log: format!("expected vertex + fragment, got {} + {}", vs.stage, fs.stage),
            });
        }

        let mut linked = LinkedProgram::default();
        for (location, name) in vs.attributes.iter().enumerate() {
            linked.attributes.insert(name.clone(), location as u32);
        }
        for name in vs.uniforms.iter().chain(&fs.uniforms) {
            let location = UniformLocation(linked.uniforms.len() as u32);
            linked.uniforms.entry(name.clone()).or_insert(location);
        }

        let program = ProgramHandle(self.next());
        self.programs.insert(program.0, linked);
        self.commands.push(GpuCommand::LinkProgram {
            program,
            vertex,
            fragment,
        });
        Ok(program)
    }

    fn attribute_locations(&self, program: ProgramHandle) -> BTreeMap<String, u32> {
        self.programs
            .get(&program.0)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn uniform_locations(&self, program: ProgramHandle) -> BTreeMap<String, UniformLocation> {
        self.programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if !self.programs.contains_key(&program.0) {
            tracing::warn!(program = program.0, "use_program with unknown handle");
        }
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        self.vertex_arrays += 1;
        let vao = VertexArrayHandle(self.next());
        self.commands.push(GpuCommand::CreateVertexArray(vao));
        vao
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        self.commands.push(GpuCommand::BindVertexArray(vao));
    }

    fn upload_buffer(&mut self, kind: BufferKind, data: &[u8]) -> BufferHandle {
        let buffer = BufferHandle(self.next());
        self.buffers.insert(buffer.0, data.to_vec());
        self.commands.push(GpuCommand::UploadBuffer {
            kind,
            buffer,
            bytes: data.len(),
        });
        buffer
    }

    fn bind_attribute(&mut self, location: u32, buffer: BufferHandle, components: u32) {
        self.commands.push(GpuCommand::BindAttribute {
            location,
            buffer,
            components,
        });
    }

    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.commands
            .push(GpuCommand::UploadUniform { location, value });
    }

    fn set_face_culling(&mut self, enabled: bool) {
        self.commands.push(GpuCommand::SetFaceCulling(enabled));
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        self.commands.push(GpuCommand::DrawArrays {
            primitive,
            first,
            count,
        });
    }

    fn draw_elements(&mut self, primitive: Primitive, count: u32, width: IndexWidth, offset: u32) {
        self.commands.push(GpuCommand::DrawElements {
            primitive,
            count,
            width,
            offset,
        });
    }

    fn clear(&mut self, values: &ClearValues, mask: ClearMask) {
        self.commands.push(GpuCommand::Clear {
            values: *values,
            mask,
        });
    }
}
