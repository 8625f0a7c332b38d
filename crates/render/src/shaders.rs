/// Lambert shading with a single summed light vector plus an ambient term.
/// Normals are moved to world space by `normalMatrix` before lighting.
pub const DIFFUSE_VERTEX: &str = r#"#version 300 es
precision highp float;

in vec3 position;
in vec3 normal;

uniform mat4 modelViewProjection;
uniform mat4 normalMatrix;

out vec3 vNormal;

void main() {
    vNormal = mat3(normalMatrix) * normal;
    gl_Position = modelViewProjection * vec4(position, 1.0);
}
"#;

pub const DIFFUSE_FRAGMENT: &str = r#"#version 300 es
precision highp float;

in vec3 vNormal;

uniform vec3 light;
uniform vec4 color;
uniform float ambient;

out vec4 fragColor;

void main() {
    float strength = length(light);
    vec3 toLight = strength > 0.0 ? -light / strength : vec3(0.0);
    float lambert = max(dot(normalize(vNormal), toLight), 0.0) * strength;
    fragColor = vec4(color.rgb * (ambient + lambert), color.a);
}
"#;

/// Unlit line segments.
pub const LINES_VERTEX: &str = r#"#version 300 es
precision highp float;

in vec3 position;

uniform mat4 modelViewProjection;

void main() {
    gl_Position = modelViewProjection * vec4(position, 1.0);
}
"#;

pub const LINES_FRAGMENT: &str = r#"#version 300 es
precision highp float;

uniform vec4 color;

out vec4 fragColor;

void main() {
    fragColor = color;
}
"#;

/// Unlit round points.
pub const POINTS_VERTEX: &str = r#"#version 300 es
precision highp float;

in vec3 position;

uniform mat4 modelViewProjection;
uniform float pointSize;

void main() {
    gl_PointSize = pointSize;
    gl_Position = modelViewProjection * vec4(position, 1.0);
}
"#;

pub const POINTS_FRAGMENT: &str = r#"#version 300 es
precision highp float;

uniform vec4 color;

out vec4 fragColor;

void main() {
    vec2 offset = gl_PointCoord - vec2(0.5);
    if (dot(offset, offset) > 0.25) {
        discard;
    }
    fragColor = color;
}
"#;
