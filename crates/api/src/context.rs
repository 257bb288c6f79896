use despacho_auth::Role;
use despacho_core::UsuarioId;

/// Authenticated human principal for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    usuario_id: UsuarioId,
    nombre: String,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(usuario_id: UsuarioId, nombre: String, roles: Vec<Role>) -> Self {
        Self {
            usuario_id,
            nombre,
            roles,
        }
    }

    pub fn usuario_id(&self) -> UsuarioId {
        self.usuario_id
    }

    pub fn nombre(&self) -> &str {
        &self.nombre
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

/// Who is calling the service task boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerContext {
    /// Internal caller holding the service API key (e.g. the retry loop).
    Service,
    /// Human caller holding a JWT.
    Principal(PrincipalContext),
}
