fn main() {
    // Gera as constantes de build (versão, perfil, target) usadas pelo /health
    built::write_built_file().expect("Falha ao gerar informações de build");
}
