use proc_macro::TokenStream;
use quote::quote;

/// Emits a field-sequential `BathronDeserialize` impl for a plain struct.
///
/// The generated code refers to `BathronDeserialize` and `SerializationError`
/// unqualified, so both must be in scope at the derive site.
pub fn impl_deser_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let is_tuple_struct = match ast.data {
        syn::Data::Struct(ref data) => matches!(data.fields, syn::Fields::Unnamed(_)),
        _ => false,
    };
    let statements: Vec<proc_macro2::TokenStream> = match ast.data {
        syn::Data::Struct(ref data) => data.fields.iter().map(deserialize_field).collect(),
        _ => panic!("BathronDeserialize can only be derived for structs"),
    };
    let expanded = if is_tuple_struct {
        quote! {
            impl BathronDeserialize for #name {
                fn bathron_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name (
                        #(#statements)*
                    ))
                }
            }
        }
    } else {
        quote! {
            impl BathronDeserialize for #name {
                fn bathron_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name {
                        #(#statements)*
                    })
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field) -> proc_macro2::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(name) => {
            quote! { #name: <#ty as BathronDeserialize>::bathron_deserialize(&mut target)?, }
        }
        None => {
            quote! { <#ty as BathronDeserialize>::bathron_deserialize(&mut target)?, }
        }
    }
}
